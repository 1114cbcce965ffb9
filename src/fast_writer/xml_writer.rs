//! Optimized XML builder with minimal allocations
//!
//! Markup accumulates in a reusable buffer which the caller drains into the
//! ZIP entry it belongs to.

/// Fast XML writer over a growable byte buffer
pub struct XmlWriter {
    buffer: Vec<u8>,
    num: itoa::Buffer,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        XmlWriter {
            buffer: Vec::with_capacity(capacity),
            num: itoa::Buffer::new(),
        }
    }

    /// Write raw bytes directly
    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write string data
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.write_raw(s.as_bytes())
    }

    /// Write an unsigned integer in decimal
    #[inline]
    pub fn write_int(&mut self, value: u64) {
        let text = self.num.format(value);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Write a signed integer in decimal
    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        let text = self.num.format(value);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Write XML element start tag
    #[inline]
    pub fn start_element(&mut self, name: &str) {
        self.write_raw(b"<");
        self.write_str(name);
    }

    /// Write XML element end tag
    #[inline]
    pub fn end_element(&mut self, name: &str) {
        self.write_raw(b"</");
        self.write_str(name);
        self.write_raw(b">")
    }

    /// Close an open start tag as a self-closing element
    #[inline]
    pub fn close_empty(&mut self) {
        self.write_raw(b"/>")
    }

    /// Write attribute
    #[inline]
    pub fn attribute(&mut self, name: &str, value: &str) {
        self.write_raw(b" ");
        self.write_str(name);
        self.write_raw(b"=\"");
        self.write_escaped(value);
        self.write_raw(b"\"")
    }

    /// Write attribute with integer value
    #[inline]
    pub fn attribute_int(&mut self, name: &str, value: u64) {
        self.write_raw(b" ");
        self.write_str(name);
        self.write_raw(b"=\"");
        self.write_int(value);
        self.write_raw(b"\"")
    }

    /// Close start tag
    #[inline]
    pub fn close_start_tag(&mut self) {
        self.write_raw(b">")
    }

    /// Write text content with XML escaping
    ///
    /// Characters XML 1.0 cannot carry are written as `_xHHHH_`, and an
    /// underscore that would otherwise read as such an escape is itself
    /// escaped as `_x005F_`.
    pub fn write_escaped(&mut self, text: &str) {
        let bytes = text.as_bytes();
        for (i, c) in text.char_indices() {
            match c {
                '&' => self.write_raw(b"&amp;"),
                '<' => self.write_raw(b"&lt;"),
                '>' => self.write_raw(b"&gt;"),
                '"' => self.write_raw(b"&quot;"),
                '\'' => self.write_raw(b"&apos;"),
                '\t' | '\n' | '\r' => self.buffer.push(c as u8),
                '_' if is_escape_sequence(&bytes[i..]) => self.write_raw(b"_x005F_"),
                c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {
                    let escaped = format!("_x{:04X}_", c as u32);
                    self.write_str(&escaped);
                }
                c => {
                    let mut buf = [0; 4];
                    self.buffer
                        .extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard the content, keeping the allocation
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// `_x` + four hex digits + `_` at the start of `bytes`
fn is_escape_sequence(bytes: &[u8]) -> bool {
    bytes.len() >= 7
        && bytes[1] == b'x'
        && bytes[2..6].iter().all(u8::is_ascii_hexdigit)
        && bytes[6] == b'_'
}

/// Text needs `xml:space="preserve"` to keep leading or trailing whitespace
pub fn needs_space_preserve(text: &str) -> bool {
    let is_space = |c: char| matches!(c, ' ' | '\t' | '\n' | '\r');
    text.starts_with(is_space) || text.ends_with(is_space)
}
