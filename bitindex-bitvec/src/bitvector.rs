use bitindex_base::{kind_err, Kind, Result};

use crate::indexset::IndexSet;
use crate::word::{
    fill_length, fill_value, is_fill, literal_of, make_fill, mask_of, word_bit_span, LITERAL_MASK,
    W,
};

/// A compressed bitmap using word-aligned hybrid (WAH) encoding.
///
/// Internally a sequence of sealed `words` (each a literal or a fill, in
/// canonical form: no two adjacent fills of the same value) plus a
/// trailing partial literal (`active`/`active_nbits`) that has not yet
/// been sealed. `size()` and `count()` are cached, updated incrementally
/// by every mutator.
#[derive(Clone, Debug, Default)]
pub struct Bitvector {
    words: Vec<u32>,
    /// `prefix[i]` = total bits contributed by `words[0..=i]` (inclusive
    /// cumulative), kept in sync with `words` to give `find` O(log k)
    /// lookup via binary search.
    prefix: Vec<u64>,
    active: u32,
    active_nbits: u32,
    nbits: u32,
    cnt: u32,
}

fn canon_uniform(word: u32) -> Option<(bool, u32)> {
    if is_fill(word) {
        Some((fill_value(word), fill_length(word)))
    } else if word & LITERAL_MASK == 0 {
        Some((false, 1))
    } else if word & LITERAL_MASK == LITERAL_MASK {
        Some((true, 1))
    } else {
        None
    }
}

impl Bitvector {
    pub fn new() -> Self {
        Bitvector::default()
    }

    /// An all-zero bitvector of the given size.
    pub fn zeros(size: u32) -> Self {
        let mut bv = Bitvector::new();
        bv.append_run(false, size);
        bv
    }

    /// An all-one bitvector of the given size.
    pub fn ones(size: u32) -> Self {
        let mut bv = Bitvector::new();
        bv.append_run(true, size);
        bv
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.nbits
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.cnt
    }

    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    fn rebuild_prefix_from(&mut self, from: usize) {
        let mut running = if from == 0 {
            0u64
        } else {
            self.prefix[from - 1]
        };
        self.prefix.truncate(from);
        for &w in &self.words[from..] {
            running += word_bit_span(w);
            self.prefix.push(running);
        }
    }

    /// Append one literal unit of exactly `W` raw payload bits, merging
    /// with the previous sealed word when possible. Requires the active
    /// tail to be empty; used internally once a run of exactly `W` bits
    /// has accumulated.
    fn push_unit(&mut self, bits: u32) {
        debug_assert_eq!(self.active_nbits, 0);
        if bits == 0 {
            self.push_fill(false, 1);
        } else if bits & LITERAL_MASK == LITERAL_MASK {
            self.push_fill(true, 1);
        } else {
            self.words.push(bits & LITERAL_MASK);
            let running = self.prefix.last().copied().unwrap_or(0) + W as u64;
            self.prefix.push(running);
        }
    }

    /// Append a run of `length` (in units of `W` bits) identical words of
    /// the given value, merging with the previous sealed word when
    /// possible.
    fn push_fill(&mut self, value: bool, length: u32) {
        if length == 0 {
            return;
        }
        if let Some(&last) = self.words.last() {
            if let Some((lv, ll)) = canon_uniform(last) {
                if lv == value {
                    let idx = self.words.len() - 1;
                    self.words[idx] = make_fill(value, ll + length);
                    *self.prefix.last_mut().unwrap() += length as u64 * W as u64;
                    return;
                }
            }
        }
        let word = if length == 1 {
            literal_of(value)
        } else {
            make_fill(value, length)
        };
        let running = self.prefix.last().copied().unwrap_or(0)
            + if length == 1 { W as u64 } else { length as u64 * W as u64 };
        self.words.push(word);
        self.prefix.push(running);
    }

    /// Append one bit. O(1) amortised: may merge the new bit with the
    /// trailing literal, convert a run of identical literals into a
    /// fill, or extend an existing fill.
    pub fn append_bit(&mut self, b: bool) {
        if b {
            self.active |= 1 << self.active_nbits;
        }
        self.active_nbits += 1;
        self.nbits += 1;
        if b {
            self.cnt += 1;
        }
        if self.active_nbits == W {
            self.push_unit(self.active);
            self.active = 0;
            self.active_nbits = 0;
        }
    }

    /// Append a run of `length` identical bits. O(1) amortised.
    pub fn append_run(&mut self, value: bool, mut length: u32) {
        if length == 0 {
            return;
        }
        self.nbits += length;
        if value {
            self.cnt += length;
        }
        if self.active_nbits > 0 {
            let space = W - self.active_nbits;
            let take = space.min(length);
            if value {
                self.active |= mask_of(take) << self.active_nbits;
            }
            self.active_nbits += take;
            length -= take;
            if self.active_nbits == W {
                self.push_unit(self.active);
                self.active = 0;
                self.active_nbits = 0;
            }
            if length == 0 {
                return;
            }
        }
        let full_units = length / W;
        if full_units > 0 {
            self.push_fill(value, full_units);
            length -= full_units * W;
        }
        if length > 0 {
            self.active = if value { mask_of(length) } else { 0 };
            self.active_nbits = length;
        }
    }

    /// Append exactly `W` raw (possibly mixed) payload bits as one
    /// literal unit. Used by the logical-operator co-traversal, which
    /// only ever produces whole units or a final partial tail, and by
    /// the codec when decoding a stored literal word.
    pub(crate) fn append_literal_unit(&mut self, bits: u32) {
        debug_assert_eq!(self.active_nbits, 0);
        self.nbits += W;
        self.cnt += (bits & LITERAL_MASK).count_ones();
        self.push_unit(bits & LITERAL_MASK);
    }

    /// Append `nbits` raw (possibly mixed) payload bits as the final
    /// tail. Requires the active tail to be empty.
    pub(crate) fn append_tail_bits(&mut self, bits: u32, nbits: u32) {
        debug_assert_eq!(self.active_nbits, 0);
        if nbits == 0 {
            return;
        }
        let bits = bits & mask_of(nbits);
        self.nbits += nbits;
        self.cnt += bits.count_ones();
        self.active = bits;
        self.active_nbits = nbits;
    }

    fn binary_op(a: &Bitvector, b: &Bitvector, op: impl Fn(bool, bool) -> bool) -> Result<Bitvector> {
        if a.nbits != b.nbits {
            return Err(kind_err(
                Kind::SizeMismatch,
                format!(
                    "logical op on bitvectors of different size: {} vs {}",
                    a.nbits, b.nbits
                ),
            ));
        }
        let mut out = Bitvector::new();
        let mut ca = SealedCursor::new(&a.words);
        let mut cb = SealedCursor::new(&b.words);
        while ca.has_more() && cb.has_more() {
            let wa = ca.current();
            let wb = cb.current();
            let ra = ca.remaining();
            let rb = cb.remaining();
            let n = ra.min(rb);
            let fa = is_fill(wa);
            let fb = is_fill(wb);
            if fa && fb {
                let value = op(fill_value(wa), fill_value(wb));
                out.push_fill_direct(value, n);
            } else {
                debug_assert_eq!(n, 1);
                let bits_a = if fa {
                    literal_of(fill_value(wa))
                } else {
                    wa & LITERAL_MASK
                };
                let bits_b = if fb {
                    literal_of(fill_value(wb))
                } else {
                    wb & LITERAL_MASK
                };
                let mut result = 0u32;
                for bit in 0..W {
                    let ba = (bits_a >> bit) & 1 != 0;
                    let bb = (bits_b >> bit) & 1 != 0;
                    if op(ba, bb) {
                        result |= 1 << bit;
                    }
                }
                out.append_literal_unit(result);
            }
            ca.advance(n);
            cb.advance(n);
        }
        debug_assert_eq!(a.active_nbits, b.active_nbits);
        let mut tail = 0u32;
        for bit in 0..a.active_nbits {
            let ba = (a.active >> bit) & 1 != 0;
            let bb = (b.active >> bit) & 1 != 0;
            if op(ba, bb) {
                tail |= 1 << bit;
            }
        }
        out.append_tail_bits(tail, a.active_nbits);
        Ok(out)
    }

    /// Push a run of whole units directly (used by `binary_op`, which
    /// already guarantees the active tail is empty between units).
    fn push_fill_direct(&mut self, value: bool, units: u32) {
        debug_assert_eq!(self.active_nbits, 0);
        self.nbits += units * W;
        if value {
            self.cnt += units * W;
        }
        self.push_fill(value, units);
    }

    pub fn logical_and(&self, other: &Bitvector) -> Result<Bitvector> {
        Bitvector::binary_op(self, other, |a, b| a && b)
    }
    pub fn logical_or(&self, other: &Bitvector) -> Result<Bitvector> {
        Bitvector::binary_op(self, other, |a, b| a || b)
    }
    pub fn logical_xor(&self, other: &Bitvector) -> Result<Bitvector> {
        Bitvector::binary_op(self, other, |a, b| a ^ b)
    }
    pub fn logical_minus(&self, other: &Bitvector) -> Result<Bitvector> {
        Bitvector::binary_op(self, other, |a, b| a && !b)
    }

    pub fn logical_not(&self) -> Bitvector {
        let mut out = Bitvector::new();
        let mut c = SealedCursor::new(&self.words);
        while c.has_more() {
            let w = c.current();
            let n = c.remaining();
            if is_fill(w) {
                out.push_fill_direct(!fill_value(w), n);
            } else {
                out.append_literal_unit(!w & LITERAL_MASK);
            }
            c.advance(n);
        }
        out.append_tail_bits(!self.active & mask_of(self.active_nbits), self.active_nbits);
        out
    }

    /// Total bits contributed by the sealed `words` vector (excludes the
    /// active tail).
    fn sealed_bit_len(&self) -> u64 {
        self.prefix.last().copied().unwrap_or(0)
    }

    /// Returns the encoded word offset enclosing bit `pos`, via binary
    /// search over the cached prefix sum of run lengths. `Err` if `pos`
    /// falls in the active tail (callers should check that first) or is
    /// out of range.
    pub fn find(&self, pos: u32) -> Result<usize> {
        if pos as u64 >= self.sealed_bit_len() {
            return Err(kind_err(
                Kind::SizeMismatch,
                "find: position is in the active tail or out of range",
            ));
        }
        let idx = self.prefix.partition_point(|&c| c <= pos as u64);
        Ok(idx)
    }

    fn local_merge(&mut self, start: usize, end: usize) {
        loop {
            let lo = start.saturating_sub(1);
            let hi = (end + 1).min(self.words.len().saturating_sub(1));
            let mut merged_any = false;
            let mut i = lo;
            while i < hi && i + 1 < self.words.len() {
                if let (Some((va, la)), Some((vb, lb))) =
                    (canon_uniform(self.words[i]), canon_uniform(self.words[i + 1]))
                {
                    if va == vb {
                        self.words[i] = make_fill(va, la + lb);
                        self.words.remove(i + 1);
                        merged_any = true;
                        continue;
                    }
                }
                i += 1;
            }
            if !merged_any {
                break;
            }
        }
        self.rebuild_prefix_from(lo_bound(start));
    }

    /// Random write: set the bit at `pos` to `b`. O(log k) to locate the
    /// word, then may split a fill into two fills plus a literal.
    /// Intended for construction, not high-frequency updates.
    pub fn set_bit(&mut self, pos: u32, b: bool) -> Result<()> {
        if pos >= self.nbits {
            return Err(kind_err(
                Kind::SizeMismatch,
                format!("set_bit: position {pos} out of range for size {}", self.nbits),
            ));
        }
        let sealed = self.sealed_bit_len();
        if pos as u64 >= sealed {
            let bit_in_tail = pos - sealed as u32;
            let old = (self.active >> bit_in_tail) & 1 != 0;
            if old != b {
                if b {
                    self.active |= 1 << bit_in_tail;
                    self.cnt += 1;
                } else {
                    self.active &= !(1 << bit_in_tail);
                    self.cnt -= 1;
                }
            }
            return Ok(());
        }
        let idx = self.find(pos)?;
        let word_start = if idx == 0 { 0 } else { self.prefix[idx - 1] };
        let offset = (pos as u64 - word_start) as u32;
        let word = self.words[idx];
        if is_fill(word) {
            let value = fill_value(word);
            if value == b {
                return Ok(());
            }
            let len_units = fill_length(word);
            let unit_idx = offset / W;
            let bit_in_unit = offset % W;
            let mut replacement = Vec::with_capacity(3);
            if unit_idx > 0 {
                replacement.push(make_fill(value, unit_idx));
            }
            let lit = literal_of(value) ^ (1 << bit_in_unit);
            replacement.push(lit & LITERAL_MASK);
            let suffix_units = len_units - unit_idx - 1;
            if suffix_units > 0 {
                replacement.push(make_fill(value, suffix_units));
            }
            let replacement_len = replacement.len();
            self.words.splice(idx..idx + 1, replacement);
            if b {
                self.cnt += 1;
            } else {
                self.cnt -= 1;
            }
            self.rebuild_prefix_from(idx);
            self.local_merge(idx, idx + replacement_len);
        } else {
            let old_bit = (word >> offset) & 1 != 0;
            if old_bit != b {
                self.words[idx] = (word ^ (1 << offset)) & LITERAL_MASK;
                if b {
                    self.cnt += 1;
                } else {
                    self.cnt -= 1;
                }
                self.rebuild_prefix_from(idx);
                self.local_merge(idx, idx + 1);
            }
        }
        Ok(())
    }

    pub fn get_bit(&self, pos: u32) -> bool {
        if pos >= self.nbits {
            return false;
        }
        let sealed = self.sealed_bit_len();
        if pos as u64 >= sealed {
            let bit_in_tail = pos - sealed as u32;
            return (self.active >> bit_in_tail) & 1 != 0;
        }
        let idx = self.find(pos).expect("bounds already checked");
        let word_start = if idx == 0 { 0 } else { self.prefix[idx - 1] };
        let offset = (pos as u64 - word_start) as u32;
        let word = self.words[idx];
        if is_fill(word) {
            fill_value(word)
        } else {
            (word >> offset) & 1 != 0
        }
    }

    /// Truncate or pad to `new_size`; padding uses a single fill where
    /// possible.
    pub fn adjust_size(&mut self, fill_value: bool, new_size: u32) {
        use std::cmp::Ordering;
        match new_size.cmp(&self.nbits) {
            Ordering::Equal => {}
            Ordering::Greater => self.append_run(fill_value, new_size - self.nbits),
            Ordering::Less => {
                let mut truncated = Bitvector::new();
                let mut c = SealedCursor::new(&self.words);
                let mut remaining_bits = new_size as u64;
                while c.has_more() && remaining_bits > 0 {
                    let w = c.current();
                    let n = c.remaining();
                    let span = if is_fill(w) {
                        n as u64 * W as u64
                    } else {
                        W as u64
                    };
                    if span <= remaining_bits {
                        if is_fill(w) {
                            truncated.push_fill_direct(fill_value_of(w), n);
                        } else {
                            truncated.append_literal_unit(w);
                        }
                        remaining_bits -= span;
                        c.advance(n);
                    } else {
                        // Partial consumption of this unit (only possible for a fill).
                        debug_assert!(is_fill(w));
                        let whole = (remaining_bits / W as u64) as u32;
                        if whole > 0 {
                            truncated.push_fill_direct(fill_value_of(w), whole);
                        }
                        let rem = (remaining_bits - whole as u64 * W as u64) as u32;
                        if rem > 0 {
                            truncated.append_tail_bits(
                                if fill_value_of(w) { mask_of(rem) } else { 0 },
                                rem,
                            );
                        }
                        remaining_bits = 0;
                    }
                }
                if remaining_bits > 0 {
                    // Fell short inside the active tail.
                    let take = remaining_bits as u32;
                    truncated.append_tail_bits(self.active, take.min(self.active_nbits));
                }
                *self = truncated;
            }
        }
    }

    pub fn first_index_set(&self) -> IndexSet<'_> {
        IndexSet::new(self)
    }

    pub(crate) fn words(&self) -> &[u32] {
        &self.words
    }
    pub(crate) fn active(&self) -> (u32, u32) {
        (self.active, self.active_nbits)
    }

    /// Decompress to a plain `Vec<bool>`. Used by tests and as the last
    /// resort for callers that genuinely need the uncompressed form.
    pub fn to_bit_vec(&self) -> Vec<bool> {
        let mut out = Vec::with_capacity(self.nbits as usize);
        for &w in &self.words {
            if is_fill(w) {
                let len = fill_length(w);
                let v = fill_value(w);
                for _ in 0..(len as u64 * W as u64) {
                    out.push(v);
                }
            } else {
                for bit in 0..W {
                    out.push((w >> bit) & 1 != 0);
                }
            }
        }
        for bit in 0..self.active_nbits {
            out.push((self.active >> bit) & 1 != 0);
        }
        out
    }

    pub fn from_bit_vec(bits: &[bool]) -> Bitvector {
        let mut bv = Bitvector::new();
        let mut i = 0;
        while i < bits.len() {
            let v = bits[i];
            let mut j = i + 1;
            while j < bits.len() && bits[j] == v {
                j += 1;
            }
            bv.append_run(v, (j - i) as u32);
            i = j;
        }
        bv
    }

    /// Sanity-check internal invariants; used by tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> bool {
        // No two adjacent sealed words are both uniform runs of the same value
        // (they would be mergeable into a single fill).
        for pair in self.words.windows(2) {
            if let (Some((va, _)), Some((vb, _))) = (canon_uniform(pair[0]), canon_uniform(pair[1])) {
                if va == vb {
                    return false;
                }
            }
        }
        let mut computed_size = 0u64;
        let mut computed_cnt = 0u64;
        for &w in &self.words {
            if is_fill(w) {
                let len = fill_length(w) as u64;
                computed_size += len * W as u64;
                if fill_value(w) {
                    computed_cnt += len * W as u64;
                }
            } else {
                computed_size += W as u64;
                computed_cnt += (w & LITERAL_MASK).count_ones() as u64;
            }
        }
        computed_size += self.active_nbits as u64;
        computed_cnt += (self.active & mask_of(self.active_nbits)).count_ones() as u64;
        if computed_size != self.nbits as u64 || computed_cnt != self.cnt as u64 {
            return false;
        }
        if self.prefix.len() != self.words.len() {
            return false;
        }
        self.active_nbits < W
    }
}

fn fill_value_of(w: u32) -> bool {
    fill_value(w)
}

fn lo_bound(start: usize) -> usize {
    start.saturating_sub(1)
}

/// Walks the sealed word sequence in units of `W` bits, where a literal
/// is one unit and a fill is `fill_length` repeated units. Used by the
/// logical-op co-traversal and by truncation.
struct SealedCursor<'a> {
    words: &'a [u32],
    idx: usize,
    remaining: u32,
}

impl<'a> SealedCursor<'a> {
    fn new(words: &'a [u32]) -> Self {
        let remaining = words.first().map_or(0, |&w| if is_fill(w) { fill_length(w) } else { 1 });
        SealedCursor { words, idx: 0, remaining }
    }
    fn has_more(&self) -> bool {
        self.idx < self.words.len()
    }
    fn current(&self) -> u32 {
        self.words[self.idx]
    }
    fn remaining(&self) -> u32 {
        self.remaining
    }
    fn advance(&mut self, n: u32) {
        self.remaining -= n;
        if self.remaining == 0 {
            self.idx += 1;
            if self.idx < self.words.len() {
                let w = self.words[self.idx];
                self.remaining = if is_fill(w) { fill_length(w) } else { 1 };
            }
        }
    }
}
