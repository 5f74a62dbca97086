//! Wide-string codec for the native boundary.
//!
//! Every string crossing to or from the engine is UTF-16LE with an explicit
//! terminating NUL unit. One canonical encoding on every platform; the
//! engine never sees host-dependent wide characters.

use zeroize::Zeroize;

/// Owned, NUL-terminated wide buffer ready to hand to the engine.
///
/// The engine only borrows the buffer for the duration of the call; the
/// bridge keeps ownership. Contents are wiped on drop so connection strings
/// and other credential-bearing text do not linger in freed memory.
pub struct WideString {
    units: Vec<u16>,
}

impl WideString {
    pub fn as_ptr(&self) -> *const u16 {
        self.units.as_ptr()
    }

    /// Length in UTF-16 units, excluding the terminator.
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for WideString {
    fn drop(&mut self) {
        self.units.zeroize();
    }
}

/// Encodes `text` as UTF-16LE with a trailing NUL unit.
pub fn encode(text: &str) -> WideString {
    let mut units: Vec<u16> = text.encode_utf16().collect();
    units.push(0);
    WideString { units }
}

/// Decodes a NUL-terminated wide string at `ptr`, or `None` for the null
/// sentinel. Unpaired surrogates decode lossily; the engine is trusted but
/// must never be able to panic the bridge.
///
/// Never frees `ptr` - ownership stays with the caller (typically routed
/// through a `ResourceTracker` or the matching engine delete call).
///
/// # Safety
///
/// `ptr`, when non-null, must point to a valid NUL-terminated sequence of
/// u16 units that stays alive for the duration of the call.
pub unsafe fn decode(ptr: *const u16) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let slice = std::slice::from_raw_parts(ptr, len);
    Some(String::from_utf16_lossy(slice))
}

/// Like [`decode`] but for buffers with an engine-supplied unit count
/// instead of a terminator.
///
/// # Safety
///
/// `ptr`, when non-null, must be valid for `len` u16 units.
pub unsafe fn decode_len(ptr: *const u16, len: usize) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let slice = std::slice::from_raw_parts(ptr, len);
    Some(String::from_utf16_lossy(slice))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        let w = encode("abc");
        assert_eq!(w.len(), 3);
        let units = unsafe { std::slice::from_raw_parts(w.as_ptr(), 4) };
        assert_eq!(units, &[b'a' as u16, b'b' as u16, b'c' as u16, 0]);
    }

    #[test]
    fn test_encode_empty() {
        let w = encode("");
        assert_eq!(w.len(), 0);
        assert!(w.is_empty());
        let units = unsafe { std::slice::from_raw_parts(w.as_ptr(), 1) };
        assert_eq!(units, &[0]);
    }

    #[test]
    fn test_roundtrip_ascii() {
        let w = encode("SELECT 1 FROM dual");
        let back = unsafe { decode(w.as_ptr()) };
        assert_eq!(back.as_deref(), Some("SELECT 1 FROM dual"));
    }

    #[test]
    fn test_roundtrip_non_ascii() {
        for s in ["Erro em português: €$¥", "日本語テスト", "emoji 🦀 ok"] {
            let w = encode(s);
            let back = unsafe { decode(w.as_ptr()) };
            assert_eq!(back.as_deref(), Some(s));
        }
    }

    #[test]
    fn test_decode_null_sentinel() {
        let back = unsafe { decode(std::ptr::null()) };
        assert_eq!(back, None);
        let back = unsafe { decode_len(std::ptr::null(), 5) };
        assert_eq!(back, None);
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let units: Vec<u16> = vec![b'h' as u16, b'i' as u16, 0, b'x' as u16];
        let back = unsafe { decode(units.as_ptr()) };
        assert_eq!(back.as_deref(), Some("hi"));
    }

    #[test]
    fn test_decode_len_ignores_embedded_nul() {
        let units: Vec<u16> = vec![b'a' as u16, 0, b'b' as u16];
        let back = unsafe { decode_len(units.as_ptr(), 3) };
        assert_eq!(back.as_deref(), Some("a\0b"));
    }

    #[test]
    fn test_decode_lossy_on_unpaired_surrogate() {
        let units: Vec<u16> = vec![0xD800, b'!' as u16, 0];
        let back = unsafe { decode(units.as_ptr()) }.expect("decodes");
        assert!(back.contains('!'));
        assert!(back.contains('\u{FFFD}'));
    }
}
