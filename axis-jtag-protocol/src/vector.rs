//! Word-interleaved packing of TMS/TDI bit vectors.
//!
//! A shift request is one header word followed by TMS and TDI, interleaved
//! word by word (`TMS[0] TDI[0] TMS[1] TDI[1] ...`). Each vector is padded to a
//! whole number of words; the receiver only interprets the first `bit_count` bits.

/// Sizes derived from a bit count and the negotiated word size.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VectorLayout {
    word_size: usize,
    bit_count: u32,
    byte_count: usize,
    whole_words: usize,
    remainder_bytes: usize,
}

impl VectorLayout {
    /// # Panics
    ///
    /// If `word_size` is zero.
    pub fn new(bit_count: u32, word_size: usize) -> VectorLayout {
        assert!(word_size > 0, "word size must not be zero");
        let byte_count = bit_count.div_ceil(8) as usize;
        let whole_words = byte_count / word_size;
        VectorLayout {
            word_size,
            bit_count,
            byte_count,
            whole_words,
            remainder_bytes: byte_count - whole_words * word_size,
        }
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    /// `ceil(bit_count / 8)`; also the size of the TDO reply.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// Number of words that are completely filled by one vector.
    pub fn whole_words(&self) -> usize {
        self.whole_words
    }

    /// Bytes of one vector that spill into a partially used last word.
    pub fn remainder_bytes(&self) -> usize {
        self.remainder_bytes
    }

    /// Number of words one padded vector occupies.
    pub fn words_per_vector(&self) -> usize {
        self.byte_count.div_ceil(self.word_size)
    }

    /// One vector, padded to whole words.
    pub fn padded_byte_count(&self) -> usize {
        self.words_per_vector() * self.word_size
    }

    /// Size of the body (both vectors) without header.
    pub fn body_len(&self) -> usize {
        2 * self.padded_byte_count()
    }

    /// Size of the complete request including the header word.
    pub fn request_len(&self) -> usize {
        self.word_size + self.body_len()
    }

    /// Interleaves `tms` and `tdi` into `body`.
    ///
    /// Only the first [`byte_count`](Self::byte_count) bytes of each vector are used.
    /// Padding bytes of the last word are left untouched.
    ///
    /// # Panics
    ///
    /// If a vector is shorter than `byte_count` or `body` shorter than `body_len`.
    pub fn pack(&self, tms: &[u8], tdi: &[u8], body: &mut [u8]) {
        let ws = self.word_size;
        let tms = &tms[..self.byte_count];
        let tdi = &tdi[..self.byte_count];
        let body = &mut body[..self.body_len()];

        for (slot, (tms_word, tdi_word)) in body
            .chunks_exact_mut(2 * ws)
            .zip(tms.chunks(ws).zip(tdi.chunks(ws)))
        {
            // the last chunk may be shorter than a word
            slot[..tms_word.len()].copy_from_slice(tms_word);
            slot[ws..ws + tdi_word.len()].copy_from_slice(tdi_word);
        }
    }

    /// Splits an interleaved body back into TMS and TDI, each `byte_count` long.
    ///
    /// # Panics
    ///
    /// If `body` is shorter than `body_len`.
    pub fn unpack(&self, body: &[u8]) -> (Box<[u8]>, Box<[u8]>) {
        let ws = self.word_size;
        let mut tms = Vec::with_capacity(self.padded_byte_count());
        let mut tdi = Vec::with_capacity(self.padded_byte_count());
        for slot in body[..self.body_len()].chunks_exact(2 * ws) {
            tms.extend_from_slice(&slot[..ws]);
            tdi.extend_from_slice(&slot[ws..]);
        }
        tms.truncate(self.byte_count);
        tdi.truncate(self.byte_count);
        (tms.into_boxed_slice(), tdi.into_boxed_slice())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn boundary_sizes() {
        for word_size in [1, 2, 4, 8, 16] {
            let bits_per_word = 8 * word_size as u32;
            for bit_count in [
                1,
                7,
                8,
                9,
                bits_per_word - 1,
                bits_per_word,
                bits_per_word + 1,
                3 * bits_per_word + 5,
            ] {
                let layout = VectorLayout::new(bit_count, word_size);
                let bytes = bit_count.div_ceil(8) as usize;
                assert_eq!(layout.byte_count(), bytes);
                assert_eq!(
                    layout.request_len(),
                    word_size + 2 * bytes.div_ceil(word_size) * word_size
                );

                let tms = pattern(bytes, 0x11);
                let tdi = pattern(bytes, 0x80);
                let mut body = vec![0; layout.body_len()];
                layout.pack(&tms, &tdi, &mut body);
                let (got_tms, got_tdi) = layout.unpack(&body);
                assert_eq!(&got_tms[..], &tms[..], "ws={} bits={}", word_size, bit_count);
                assert_eq!(&got_tdi[..], &tdi[..], "ws={} bits={}", word_size, bit_count);
            }
        }
    }

    #[test]
    fn interleaves_word_by_word() {
        let layout = VectorLayout::new(48, 4);
        assert_eq!(layout.whole_words(), 1);
        assert_eq!(layout.remainder_bytes(), 2);
        let tms = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let tdi = [0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6];
        let mut body = vec![0xff; layout.body_len()];
        layout.pack(&tms, &tdi, &mut body);
        assert_eq!(
            body,
            vec![
                0x01, 0x02, 0x03, 0x04, 0xa1, 0xa2, 0xa3, 0xa4, //
                0x05, 0x06, 0xff, 0xff, 0xa5, 0xa6, 0xff, 0xff,
            ]
        );
    }

    #[test]
    fn exact_multiple_has_no_remainder() {
        let layout = VectorLayout::new(64, 4);
        assert_eq!(layout.whole_words(), 2);
        assert_eq!(layout.remainder_bytes(), 0);
        assert_eq!(layout.request_len(), 4 + 16);
    }

    #[test]
    fn below_one_word() {
        let layout = VectorLayout::new(3, 4);
        assert_eq!(layout.byte_count(), 1);
        assert_eq!(layout.whole_words(), 0);
        assert_eq!(layout.remainder_bytes(), 1);
        assert_eq!(layout.request_len(), 12);
    }

    #[test]
    fn longer_input_is_truncated_to_bit_count() {
        let layout = VectorLayout::new(8, 2);
        let mut body = vec![0; layout.body_len()];
        layout.pack(&[0xaa, 0xbb, 0xcc], &[0x55, 0x66], &mut body);
        assert_eq!(body, vec![0xaa, 0, 0x55, 0]);
    }
}
