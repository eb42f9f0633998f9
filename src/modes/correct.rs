//! Single-bit error correction against the CRC syndrome.
//!
//! A single flipped bit at position `i` leaves a syndrome equal to the CRC
//! table entry for `i`, so the search is a linear sweep over the table slice
//! for the message length. Bits inside the downlink format field are never
//! corrected here: flipping a DF bit changes the table slice and the CRC
//! interpretation, so the decoder sweeps those separately.

use tracing::debug;

use super::crc::{self, CRC_TABLE};
use super::icao::{AddressRegistry, Lookup};
use super::{HardBits, DF_BITS};

/// A successful correction: the flipped bit index, and for address-XORed
/// messages the registry address the corrected syndrome matched.
pub struct Fix {
    pub bit: usize,
    pub address: u32,
}

/// Try to repair a single flipped bit outside the DF field.
///
/// For plain-CRC messages the syndrome must equal a table entry directly.
/// For address-XORed messages the syndrome XOR a table entry must be a known
/// aircraft, which is only attempted when the `fix_xored` policy is enabled
/// (it is a full registry probe per bit position). The first matching
/// position in ascending bit order wins; on a match the bit is flipped in
/// place.
pub fn fix_single_bit(
    hard: &mut HardBits,
    remainder: u32,
    addr_inline: bool,
    fix_xored: bool,
    registry: &AddressRegistry,
) -> Option<Fix> {
    let bits = crc::message_bits(hard);
    let offset = crc::table_offset(bits);

    if addr_inline {
        for i in DF_BITS..bits {
            if remainder == CRC_TABLE[i + offset] {
                hard[i] ^= 1;
                return Some(Fix { bit: i, address: 0 });
            }
        }
    } else if fix_xored {
        for i in DF_BITS..bits {
            let addr = remainder ^ CRC_TABLE[i + offset];
            if registry.contains(addr) == Lookup::Known {
                hard[i] ^= 1;
                debug!("xored syndrome matched known aircraft {addr:06x}");
                return Some(Fix { bit: i, address: addr });
            }
        }
    }

    None
}
