use crate::error::SwapError;

/// Modern swap header magic, stored in the last 10 bytes of the header
/// slot. Matches `mm/swapfile.c`'s `"SWAPSPACE2"`.
pub const MAGIC: &[u8; 10] = b"SWAPSPACE2";

/// The legacy v1 magic this crate refuses to activate, matching
/// `mm/swapfile.c`'s rejected `"SWAP-SPACE"`.
pub const OLD_MAGIC: &[u8; 10] = b"SWAP-SPACE";

pub const SUPPORTED_VERSION: u32 = 1;

/// Parsed contents of a header slot (spec §4.F step 3-4). Layout mirrors
/// `mm/swapfile.c`'s `union swap_header.info`: a little-endian `version`,
/// `last_slot`, and `nr_badpages` at fixed offsets, followed by the
/// `badpages[]` array, with the magic string anchored at
/// `slot_size - 10`.
#[derive(Debug, Clone)]
pub struct Header {
    pub last_slot: u32,
    pub bad_slots: Vec<u32>,
}

pub fn parse(slot_size: u32, raw: &[u8], max_bad_slots: usize) -> Result<Header, SwapError> {
    let slot_size = slot_size as usize;
    if raw.len() < slot_size {
        return Err(SwapError::InvalidHeader("header slot truncated".into()));
    }

    let magic = &raw[slot_size - 10..slot_size];
    if magic == OLD_MAGIC {
        return Err(SwapError::InvalidHeader(
            "legacy SWAP-SPACE v1 header format is not supported".into(),
        ));
    }
    if magic != MAGIC {
        return Err(SwapError::InvalidHeader("bad magic".into()));
    }

    let version = u32::from_le_bytes(raw[0..4].try_into().unwrap());
    if version != SUPPORTED_VERSION {
        return Err(SwapError::InvalidHeader(format!(
            "unsupported header sub-version {}",
            version
        )));
    }

    let last_slot = u32::from_le_bytes(raw[4..8].try_into().unwrap());
    let nr_bad = u32::from_le_bytes(raw[8..12].try_into().unwrap()) as usize;
    if nr_bad > max_bad_slots {
        return Err(SwapError::InvalidHeader(format!(
            "bad-slot list too long: {} entries (limit {})",
            nr_bad, max_bad_slots
        )));
    }

    let mut bad_slots = Vec::with_capacity(nr_bad);
    let mut seen = std::collections::HashSet::with_capacity(nr_bad);
    for i in 0..nr_bad {
        let off = 12 + i * 4;
        if off + 4 > slot_size - 10 {
            return Err(SwapError::InvalidHeader(
                "bad-slot list overruns the header slot".into(),
            ));
        }
        let slot = u32::from_le_bytes(raw[off..off + 4].try_into().unwrap());
        if slot == 0 || slot >= last_slot {
            return Err(SwapError::InvalidHeader(format!(
                "bad slot {} is out of the area's usable range",
                slot
            )));
        }
        if !seen.insert(slot) {
            return Err(SwapError::InvalidHeader(format!(
                "duplicate bad slot {}",
                slot
            )));
        }
        bad_slots.push(slot);
    }

    Ok(Header {
        last_slot,
        bad_slots,
    })
}

/// Serialize a header slot, the inverse of `parse`. Used by tests (and any
/// tool built against this crate) to construct fixtures without hand-laying
/// out bytes.
pub fn write(slot_size: u32, last_slot: u32, bad_slots: &[u32]) -> Vec<u8> {
    let slot_size = slot_size as usize;
    let mut raw = vec![0u8; slot_size];
    raw[0..4].copy_from_slice(&SUPPORTED_VERSION.to_le_bytes());
    raw[4..8].copy_from_slice(&last_slot.to_le_bytes());
    raw[8..12].copy_from_slice(&(bad_slots.len() as u32).to_le_bytes());
    for (i, &slot) in bad_slots.iter().enumerate() {
        let off = 12 + i * 4;
        raw[off..off + 4].copy_from_slice(&slot.to_le_bytes());
    }
    raw[slot_size - 10..slot_size].copy_from_slice(MAGIC);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_write_and_parse() {
        let raw = write(4096, 100, &[5, 10, 99]);
        let header = parse(4096, &raw, 16).unwrap();
        assert_eq!(header.last_slot, 100);
        assert_eq!(header.bad_slots, vec![5, 10, 99]);
    }

    #[test]
    fn legacy_magic_is_rejected() {
        let mut raw = write(4096, 100, &[]);
        let len = raw.len();
        raw[len - 10..].copy_from_slice(OLD_MAGIC);
        assert!(matches!(
            parse(4096, &raw, 16),
            Err(SwapError::InvalidHeader(_))
        ));
    }

    #[test]
    fn bad_slot_out_of_range_is_rejected() {
        let raw = write(4096, 100, &[100]);
        assert!(matches!(
            parse(4096, &raw, 16),
            Err(SwapError::InvalidHeader(_))
        ));
    }

    #[test]
    fn too_many_bad_slots_is_rejected() {
        let raw = write(4096, 100, &[1, 2, 3]);
        assert!(matches!(
            parse(4096, &raw, 2),
            Err(SwapError::InvalidHeader(_))
        ));
    }
}
