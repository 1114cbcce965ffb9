//! Writer configuration

/// Settings consulted by every worksheet write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Shorten over-long text instead of failing the write
    pub truncate_strings: bool,
    /// Emit column names as the first row of each worksheet
    pub header: bool,
    /// Deflate level, 0-9
    pub compression_level: u32,
    /// Rows between flushes of the output (and yields on the async path)
    pub flush_interval: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            truncate_strings: false,
            header: true,
            compression_level: 6,
            flush_interval: 1000,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn truncate_strings(mut self, truncate: bool) -> Self {
        self.truncate_strings = truncate;
        self
    }

    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Set the deflate level; values above 9 are clamped
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Set the flush interval; 0 is treated as 1
    pub fn flush_interval(mut self, rows: u32) -> Self {
        self.flush_interval = rows.max(1);
        self
    }

    pub fn memory_profile(self, profile: MemoryProfile) -> Self {
        self.flush_interval(profile.flush_interval())
    }
}

/// Memory profile for different pod sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryProfile {
    /// Small pods (< 512MB): flush every 100 rows
    Low,
    /// Medium pods (512MB-1GB): flush every 500 rows
    Medium,
    /// Large pods (> 1GB): flush every 1000 rows (default)
    High,
    /// Custom flush interval
    Custom { flush_interval: u32 },
}

impl MemoryProfile {
    /// Pick a profile from a memory limit in MB
    pub fn from_memory_mb(memory_mb: usize) -> Self {
        if memory_mb < 512 {
            MemoryProfile::Low
        } else if memory_mb < 1024 {
            MemoryProfile::Medium
        } else {
            MemoryProfile::High
        }
    }

    /// Detect from environment variable MEMORY_LIMIT_MB
    pub fn from_env() -> Self {
        let profile = std::env::var("MEMORY_LIMIT_MB")
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .map(Self::from_memory_mb)
            .unwrap_or(MemoryProfile::High);
        log::debug!("memory profile {:?}", profile);
        profile
    }

    pub fn flush_interval(&self) -> u32 {
        match self {
            MemoryProfile::Low => 100,
            MemoryProfile::Medium => 500,
            MemoryProfile::High => 1000,
            MemoryProfile::Custom { flush_interval } => (*flush_interval).max(1),
        }
    }
}
