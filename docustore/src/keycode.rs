//! Order-preserving composition of the flat key the ordered engine sees out
//! of several logical segments (namespace path, bucket name, item key).
//!
//! Grounded on the teacher's `mvcc::Key` enum, which multiplexes several
//! logical keyspaces (`NextVersion`, `TxnActive`, `Version(key, version)`,
//! `Unversioned`) over one flat engine by encoding each variant so that
//! lexicographic byte order matches the intended logical order. Here there
//! is only one "variant" (an item inside a bucket inside a namespace), so
//! the encoding is simpler: each segment is escaped so that a literal
//! `0x00` inside it cannot be mistaken for the segment terminator, then
//! segments are joined by `0x00` terminators. This keeps `scan_prefix` over
//! a namespace or bucket prefix byte-range correct regardless of what bytes
//! a document id or key name contains.

/// Escapes `0x00` as `0x00 0xff` and terminates the segment with `0x00
/// 0x00`, the standard memcomparable escaping trick: `0x00 0x00` (the
/// terminator) can never appear inside an escaped segment, since every
/// literal `0x00` is immediately followed by `0xff`.
fn encode_segment(out: &mut Vec<u8>, segment: &[u8]) {
    for &b in segment {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xff);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

/// Encodes a sequence of segments into one order-preserving key. Two keys
/// compare equal-prefix-wise iff their corresponding encoded segment
/// prefixes are equal, which is what makes bucket/namespace prefix scans
/// correct.
pub fn encode(segments: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(segments.iter().map(|s| s.len() + 2).sum());
    for segment in segments {
        encode_segment(&mut out, segment);
    }
    out
}

/// Encodes only a prefix (e.g. a namespace or bucket path) for use in a
/// range scan; does not append a final terminator beyond each segment's
/// own, so the result is a valid prefix of any key with these leading
/// segments.
pub fn encode_prefix(segments: &[&[u8]]) -> Vec<u8> {
    encode(segments)
}

/// Reverses [`encode_segment`] for the single trailing segment of a key,
/// given the already-escaped bytes that follow a known prefix. Stops at the
/// first unescaped terminator, so trailing garbage past it (there shouldn't
/// be any) is ignored.
pub fn decode_segment(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut i = 0;
    while i < escaped.len() {
        match escaped[i] {
            0x00 if escaped.get(i + 1) == Some(&0xff) => {
                out.push(0x00);
                i += 2;
            }
            0x00 => break,
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}
