//! Slot layouts
//!
//! Every prefix is a 4-byte unsigned big-endian length. The reader supplies
//! the slot count; only [`Layout::Counted`] also writes it into the blob.

use shared::constants::MAX_SLOT_LEN;
use shared::{FramingError, HeStatsResult};

/// Magic bytes opening a counted blob
pub const COUNTED_MAGIC: &[u8; 4] = b"HEB1";

const PREFIX_LEN: usize = 4;

/// How slots are laid out inside a blob
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Layout {
    /// `[len][bytes]` for every slot
    #[default]
    Prefixed,
    /// Every slot prefixed except the last, which runs to the end of the
    /// blob. A single-slot blob is the raw slot bytes.
    OpenTail,
    /// `HEB1`, a u32 BE slot count, then prefixed slots
    Counted,
}

impl Layout {
    pub const ALL: [Layout; 3] = [Layout::Prefixed, Layout::OpenTail, Layout::Counted];

    pub fn name(self) -> &'static str {
        match self {
            Layout::Prefixed => "prefixed",
            Layout::OpenTail => "open-tail",
            Layout::Counted => "counted",
        }
    }
}

impl std::str::FromStr for Layout {
    type Err = shared::HeStatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prefixed" => Ok(Layout::Prefixed),
            "open-tail" | "open_tail" | "opentail" => Ok(Layout::OpenTail),
            "counted" => Ok(Layout::Counted),
            _ => Err(shared::HeStatsError::validation(format!(
                "unknown blob layout: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn prefix(slot: usize, len: usize) -> HeStatsResult<[u8; PREFIX_LEN]> {
    if len > MAX_SLOT_LEN {
        return Err(FramingError::Oversized { slot, len }.into());
    }
    Ok((len as u32).to_be_bytes())
}

/// Concatenate slots under `layout`
pub fn frame_slots<S: AsRef<[u8]>>(slots: &[S], layout: Layout) -> HeStatsResult<Vec<u8>> {
    if slots.is_empty() {
        return Err(FramingError::Empty.into());
    }
    let body: usize = slots.iter().map(|s| s.as_ref().len() + PREFIX_LEN).sum();
    let mut out = Vec::with_capacity(body + 2 * PREFIX_LEN);

    if layout == Layout::Counted {
        out.extend_from_slice(COUNTED_MAGIC);
        out.extend_from_slice(&prefix(0, slots.len())?);
    }
    let last = slots.len() - 1;
    for (i, slot) in slots.iter().enumerate() {
        let slot = slot.as_ref();
        if !(layout == Layout::OpenTail && i == last) {
            out.extend_from_slice(&prefix(i, slot.len())?);
        }
        out.extend_from_slice(slot);
    }
    Ok(out)
}

fn read_prefix(bytes: &[u8], at: usize) -> Option<usize> {
    bytes
        .get(at..at + PREFIX_LEN)
        .and_then(|b| b.try_into().ok())
        .map(|b| u32::from_be_bytes(b) as usize)
}

/// Split a blob into exactly `expected` slots
pub fn split_slots(bytes: &[u8], expected: usize, layout: Layout) -> HeStatsResult<Vec<&[u8]>> {
    if expected == 0 {
        return Err(FramingError::Empty.into());
    }

    let mut offset = 0;
    if layout == Layout::Counted {
        if bytes.get(..COUNTED_MAGIC.len()) != Some(COUNTED_MAGIC.as_slice()) {
            return Err(FramingError::Header {
                reason: "missing HEB1 magic".to_string(),
            }
            .into());
        }
        let declared = read_prefix(bytes, COUNTED_MAGIC.len()).ok_or(FramingError::Header {
            reason: "slot count truncated".to_string(),
        })?;
        if declared != expected {
            return Err(FramingError::SlotCount { declared, expected }.into());
        }
        offset = COUNTED_MAGIC.len() + PREFIX_LEN;
    }

    let mut slots = Vec::with_capacity(expected);
    for i in 0..expected {
        let remaining = bytes.len() - offset;
        if layout == Layout::OpenTail && i == expected - 1 {
            if remaining == 0 {
                return Err(FramingError::MissingSlots { expected, found: i }.into());
            }
            slots.push(&bytes[offset..]);
            offset = bytes.len();
            break;
        }
        if remaining == 0 {
            return Err(FramingError::MissingSlots { expected, found: i }.into());
        }
        let declared = read_prefix(bytes, offset).ok_or(FramingError::Truncated {
            slot: i,
            declared: PREFIX_LEN,
            available: remaining,
        })?;
        offset += PREFIX_LEN;
        let available = bytes.len() - offset;
        if declared > available {
            return Err(FramingError::Truncated {
                slot: i,
                declared,
                available,
            }
            .into());
        }
        slots.push(&bytes[offset..offset + declared]);
        offset += declared;
    }

    if offset != bytes.len() {
        return Err(FramingError::TrailingBytes {
            count: bytes.len() - offset,
        }
        .into());
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::HeStatsError;

    fn framing_err(result: HeStatsResult<Vec<&[u8]>>) -> FramingError {
        match result {
            Err(HeStatsError::Framing(e)) => e,
            other => panic!("expected framing error, got {other:?}"),
        }
    }

    #[test]
    fn test_prefixed_wire_format() {
        let blob = frame_slots(&[b"ab".as_slice(), b"xyz".as_slice()], Layout::Prefixed).unwrap();
        assert_eq!(blob, b"\x00\x00\x00\x02ab\x00\x00\x00\x03xyz");
        assert_eq!(
            split_slots(&blob, 2, Layout::Prefixed).unwrap(),
            vec![b"ab".as_slice(), b"xyz".as_slice()]
        );
    }

    #[test]
    fn test_open_tail_wire_format() {
        let blob = frame_slots(&[b"ab".as_slice(), b"xyz".as_slice()], Layout::OpenTail).unwrap();
        assert_eq!(blob, b"\x00\x00\x00\x02abxyz");
        assert_eq!(
            split_slots(&blob, 2, Layout::OpenTail).unwrap(),
            vec![b"ab".as_slice(), b"xyz".as_slice()]
        );

        // a single slot is left unframed
        let single = frame_slots(&[b"raw".as_slice()], Layout::OpenTail).unwrap();
        assert_eq!(single, b"raw");
        assert_eq!(split_slots(&single, 1, Layout::OpenTail).unwrap(), vec![b"raw".as_slice()]);
    }

    #[test]
    fn test_counted_wire_format() {
        let blob = frame_slots(&[b"q".as_slice()], Layout::Counted).unwrap();
        assert_eq!(blob, b"HEB1\x00\x00\x00\x01\x00\x00\x00\x01q");
        assert_eq!(split_slots(&blob, 1, Layout::Counted).unwrap(), vec![b"q".as_slice()]);
        assert_eq!(
            framing_err(split_slots(&blob, 2, Layout::Counted)),
            FramingError::SlotCount {
                declared: 1,
                expected: 2
            }
        );
        assert!(matches!(
            framing_err(split_slots(b"HEB2\x00\x00\x00\x01", 1, Layout::Counted)),
            FramingError::Header { .. }
        ));
    }

    #[test]
    fn test_truncated_slot() {
        let blob = b"\x00\x00\x00\x09abc";
        assert_eq!(
            framing_err(split_slots(blob, 1, Layout::Prefixed)),
            FramingError::Truncated {
                slot: 0,
                declared: 9,
                available: 3
            }
        );
        assert!(matches!(
            framing_err(split_slots(b"\x00\x00", 1, Layout::Prefixed)),
            FramingError::Truncated { slot: 0, .. }
        ));
    }

    #[test]
    fn test_trailing_and_missing_slots() {
        let blob = b"\x00\x00\x00\x01a\x00\x00\x00\x01b";
        assert_eq!(
            framing_err(split_slots(blob, 1, Layout::Prefixed)),
            FramingError::TrailingBytes { count: 5 }
        );
        assert_eq!(
            framing_err(split_slots(blob, 3, Layout::Prefixed)),
            FramingError::MissingSlots {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_empty_blob_rejected() {
        let empty: [&[u8]; 0] = [];
        assert!(matches!(
            frame_slots(&empty, Layout::Prefixed),
            Err(HeStatsError::Framing(FramingError::Empty))
        ));
        assert_eq!(framing_err(split_slots(b"", 0, Layout::Prefixed)), FramingError::Empty);
    }

    #[test]
    fn test_layout_from_str() {
        for layout in Layout::ALL {
            assert_eq!(layout.name().parse::<Layout>().unwrap(), layout);
        }
        assert!("zip".parse::<Layout>().is_err());
    }
}
