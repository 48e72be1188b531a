//! On-disk persistence for `Bitvector`.
//!
//! Layout: a little-endian `u32` total bit count (so a standalone
//! bitvector file, e.g. a null mask, is self-describing without external
//! metadata), followed by the sealed words verbatim (little-endian `u32`
//! each), followed by one or more "tail words" that carry the unsealed
//! remainder.
//!
//! A tail word is always a literal (top bit 0). Its low 5 bits hold how
//! many of its own bits are live (`0..=TAIL_BITS`, `TAIL_BITS = 26`);
//! the live bits themselves sit left-shifted above that count, in bits
//! `5..5+count`. A writer always emits at least one tail word, even when
//! the bitvector's size is an exact multiple of `W` and the true tail is
//! empty (a live count of 0), so the final word is always a literal per
//! the wire format. Since `W - 1 = 30` can exceed `TAIL_BITS`, a tail
//! longer than 26 bits is split across two such words; the reader knows
//! it has reached the real end once the running bit count it has
//! produced equals the header total, same as it does while walking the
//! sealed words.

use bitindex_base::{kind_err, Kind, Result};

use crate::bitvector::Bitvector;
use crate::ioutil::{Reader, Writer};
use crate::word::{fill_length, fill_value, is_fill, mask_of, LITERAL_MASK, W};

/// Live-bit budget of a tail word: the 31-bit literal payload minus the
/// 5 low bits spent on the count.
const TAIL_BITS: u32 = 26;

impl Bitvector {
    /// Serialize this bitvector to `wr`.
    pub fn encode(&self, wr: &mut impl Writer) -> Result<()> {
        wr.write_all(&self.size().to_le_bytes())
            .map_err(|e| kind_err(Kind::Io, e.to_string()))?;
        for &word in self.words() {
            wr.write_all(&word.to_le_bytes())
                .map_err(|e| kind_err(Kind::Io, e.to_string()))?;
        }

        let (active, active_nbits) = self.active();
        let mut offset = 0u32;
        loop {
            let count = (active_nbits - offset).min(TAIL_BITS);
            let chunk = (active >> offset) & mask_of(count);
            let word = (chunk << 5) | count;
            wr.write_all(&word.to_le_bytes())
                .map_err(|e| kind_err(Kind::Io, e.to_string()))?;
            offset += count;
            if offset >= active_nbits {
                break;
            }
        }
        Ok(())
    }

    /// Deserialize a bitvector previously written by `encode`.
    pub fn decode(rd: &mut impl Reader) -> Result<Bitvector> {
        let mut header = [0u8; 4];
        rd.read_exact(&mut header)
            .map_err(|e| kind_err(Kind::Decode, format!("truncated bitvector header: {e}")))?;
        let total_bits = u32::from_le_bytes(header) as u64;

        let mut bv = Bitvector::new();
        let mut produced = 0u64;
        let mut tail: u32 = 0;
        let mut tail_nbits: u32 = 0;
        loop {
            let remaining = total_bits - produced;
            let mut buf = [0u8; 4];
            rd.read_exact(&mut buf).map_err(|e| {
                kind_err(Kind::Decode, format!("truncated bitvector word stream: {e}"))
            })?;
            let word = u32::from_le_bytes(buf);

            if remaining >= W as u64 {
                if is_fill(word) {
                    let span = fill_length(word) as u64 * W as u64;
                    if span > remaining {
                        return Err(kind_err(
                            Kind::Decode,
                            "fill run extends past the declared bitvector size",
                        ));
                    }
                    bv.append_run(fill_value(word), span as u32);
                    produced += span;
                } else {
                    bv.append_literal_unit(word & LITERAL_MASK);
                    produced += W as u64;
                }
                continue;
            }

            // Tail phase: every remaining word is a literal carrying its
            // live-bit count in its low 5 bits.
            if is_fill(word) {
                return Err(kind_err(
                    Kind::Decode,
                    "bitvector tail word was a fill; writers must always emit a literal",
                ));
            }
            let count = word & 0x1F;
            if count as u64 > remaining || (count == 0 && remaining > 0) {
                return Err(kind_err(
                    Kind::Decode,
                    "bitvector tail word's live-bit count disagrees with the declared size",
                ));
            }
            let chunk = (word >> 5) & mask_of(count);
            tail |= chunk << tail_nbits;
            tail_nbits += count;
            produced += count as u64;
            if produced == total_bits {
                break;
            }
        }
        bv.append_tail_bits(tail, tail_nbits);
        Ok(bv)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ioutil::{MemReader, MemWriter, Writer as _};
    use test_log::test;

    fn round_trip(bv: &Bitvector) -> Bitvector {
        let mut wr = MemWriter::new();
        bv.encode(&mut wr).unwrap();
        let mut rd = wr.try_into_reader().unwrap();
        Bitvector::decode(&mut rd).unwrap()
    }

    #[test]
    fn empty_round_trips() {
        let bv = Bitvector::new();
        let out = round_trip(&bv);
        assert_eq!(out.size(), 0);
        assert_eq!(out.count(), 0);
        assert!(out.check_invariants());
    }

    #[test]
    fn exact_multiple_of_w_round_trips() {
        let bv = Bitvector::ones(W * 3);
        let out = round_trip(&bv);
        assert_eq!(out.to_bit_vec(), bv.to_bit_vec());
        assert!(out.check_invariants());
    }

    #[test]
    fn partial_tail_round_trips() {
        let mut bv = Bitvector::new();
        bv.append_run(true, W * 2 + 5);
        bv.append_run(false, 17);
        let out = round_trip(&bv);
        assert_eq!(out.to_bit_vec(), bv.to_bit_vec());
        assert_eq!(out.size(), bv.size());
        assert_eq!(out.count(), bv.count());
        assert!(out.check_invariants());
    }

    #[test]
    fn mixed_literals_and_fills_round_trip() {
        let pattern: Vec<bool> = (0..200).map(|i| i % 3 == 0 || i % 7 == 0).collect();
        let bv = Bitvector::from_bit_vec(&pattern);
        let out = round_trip(&bv);
        assert_eq!(out.to_bit_vec(), pattern);
        assert!(out.check_invariants());
    }

    #[test]
    fn truncated_header_is_decode_error() {
        let mut rd = MemReader::from(vec![0u8, 1, 2]);
        let err = Bitvector::decode(&mut rd).unwrap_err();
        assert_eq!(err.kind(), bitindex_base::Kind::Decode);
    }

    #[test]
    fn truncated_word_stream_is_decode_error() {
        let bv = Bitvector::ones(1000);
        let mut wr = MemWriter::new();
        bv.encode(&mut wr).unwrap();
        let mut rd = wr.try_into_reader().unwrap();
        // Corrupt the header to claim more bits than the stream actually holds.
        let mut rd = MemReader::from({
            use std::io::Read;
            let mut bytes = Vec::new();
            rd.read_to_end(&mut bytes).unwrap();
            bytes[0..4].copy_from_slice(&(10_000u32).to_le_bytes());
            bytes
        });
        let err = Bitvector::decode(&mut rd).unwrap_err();
        assert_eq!(err.kind(), bitindex_base::Kind::Decode);
    }

    #[test]
    fn fill_overrunning_declared_size_is_decode_error() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(10u32).to_le_bytes());
        // A fill word claiming a run far larger than W * 10 bits.
        let bogus_fill = 0x8000_0000u32 | 0x4000_0000u32 | 5;
        bytes.extend_from_slice(&bogus_fill.to_le_bytes());
        let mut rd = MemReader::from(bytes);
        let err = Bitvector::decode(&mut rd).unwrap_err();
        assert_eq!(err.kind(), bitindex_base::Kind::Decode);
    }
}
