//! Quantum decompression.
//!
//! Quantum (David Stafford, Cinematronics) is LZ77 over an adaptive
//! arithmetic coder. Eight frequency models drive decoding: a selector model
//! picks between four literal models (64 symbols each) and three match
//! shapes (3-byte, 4-byte and variable-length matches).
//!
//! Inside a CAB folder every CFDATA block restarts the arithmetic coder
//! (`H`, `L` and `C` are re-read from the block's first 16 bits) while the
//! models and the sliding window carry over, so one [`QuantumDecoder`] must
//! see the folder's blocks in order.
//!
//! Window sizes are `2^10` to `2^21` bytes.

use crate::{Error, Result};

/// Smallest accepted window, in bits.
pub const MIN_WINDOW_BITS: u8 = 10;
/// Largest accepted window, in bits.
pub const MAX_WINDOW_BITS: u8 = 21;

const POSITION_BASE: [u32; 42] = [
    0, 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536,
    2048, 3072, 4096, 6144, 8192, 12288, 16384, 24576, 32768, 49152, 65536, 98304, 131072, 196608,
    262144, 393216, 524288, 786432, 1048576, 1572864,
];

const POSITION_EXTRA: [u8; 42] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13, 14, 14, 15, 15, 16, 16, 17, 17, 18, 18, 19, 19,
];

const LENGTH_BASE: [u16; 27] = [
    0, 1, 2, 3, 4, 5, 6, 8, 10, 12, 14, 18, 22, 26, 30, 38, 46, 54, 62, 78, 94, 110, 126, 158, 190,
    222, 254,
];

const LENGTH_EXTRA: [u8; 27] = [
    0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Cumulative frequency above which a model is rescaled.
const RESCALE_THRESHOLD: u16 = 3800;

#[derive(Debug, Clone, Copy)]
struct Symbol {
    sym: u16,
    cumfreq: u16,
}

/// Adaptive frequency model over `entries` consecutive symbols.
#[derive(Debug, Clone)]
struct Model {
    shift_left: i32,
    entries: usize,
    syms: Vec<Symbol>,
}

impl Model {
    fn new(start: u16, entries: usize) -> Self {
        let syms = (0..=entries)
            .map(|i| Symbol {
                sym: start + i as u16,
                cumfreq: (entries - i) as u16,
            })
            .collect();
        Self {
            shift_left: 4,
            entries,
            syms,
        }
    }

    fn rescale(&mut self) {
        self.shift_left -= 1;
        if self.shift_left > 0 {
            for i in (0..self.entries).rev() {
                self.syms[i].cumfreq >>= 1;
                if self.syms[i].cumfreq <= self.syms[i + 1].cumfreq {
                    self.syms[i].cumfreq = self.syms[i + 1].cumfreq + 1;
                }
            }
            return;
        }

        self.shift_left = 50;
        for i in 0..self.entries {
            let next = self.syms[i + 1].cumfreq;
            let sym = &mut self.syms[i];
            sym.cumfreq = (sym.cumfreq.wrapping_sub(next) + 1) >> 1;
        }
        // Stable selection sort, most frequent first.
        for i in 0..self.entries.saturating_sub(1) {
            for j in (i + 1)..self.entries {
                if self.syms[i].cumfreq < self.syms[j].cumfreq {
                    self.syms.swap(i, j);
                }
            }
        }
        for i in (0..self.entries).rev() {
            self.syms[i].cumfreq += self.syms[i + 1].cumfreq;
        }
    }
}

/// MSB-first bit reader over big-endian 16-bit words; reads past the end
/// yield zero bits.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u32,
    bits_left: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            buffer: 0,
            bits_left: 0,
        }
    }

    fn next_byte(&mut self) -> u32 {
        let b = self.data.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b as u32
    }

    fn fill(&mut self) {
        let word = (self.next_byte() << 8) | self.next_byte();
        self.buffer |= word << (16 - self.bits_left);
        self.bits_left += 16;
    }

    fn read_bits(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        while self.bits_left < n {
            self.fill();
        }
        let v = self.buffer >> (32 - n);
        self.buffer = if n == 32 { 0 } else { self.buffer << n };
        self.bits_left -= n;
        v
    }

    /// Read up to 32 bits, refilling in 16-bit steps.
    fn read_many_bits(&mut self, mut n: u32) -> u32 {
        let mut v = 0u32;
        while n > 0 {
            if self.bits_left <= 16 {
                self.fill();
            }
            let run = n.min(self.bits_left).min(16);
            v = (v << run) | self.read_bits(run);
            n -= run;
        }
        v
    }
}

/// Arithmetic coder registers.
struct Coder {
    h: u16,
    l: u16,
    c: u16,
}

impl Coder {
    fn start(bits: &mut BitReader<'_>) -> Self {
        Self {
            h: 0xFFFF,
            l: 0,
            c: bits.read_bits(16) as u16,
        }
    }

    fn decode(&mut self, model: &mut Model, bits: &mut BitReader<'_>) -> Result<u16> {
        let (h, l, c) = (self.h as u32, self.l as u32, self.c as u32);
        let range = (h.wrapping_sub(l) & 0xFFFF) + 1;
        let total = model.syms[0].cumfreq as u32;
        if total == 0 {
            return Err(Error::Quantum);
        }

        let symf = (c.wrapping_sub(l).wrapping_add(1).wrapping_mul(total).wrapping_sub(1) / range)
            & 0xFFFF;

        let mut i = 1;
        while i < model.entries && model.syms[i].cumfreq as u32 > symf {
            i += 1;
        }
        let sym = model.syms[i - 1].sym;

        self.h = l
            .wrapping_add(model.syms[i - 1].cumfreq as u32 * range / total)
            .wrapping_sub(1) as u16;
        self.l = l.wrapping_add(model.syms[i].cumfreq as u32 * range / total) as u16;

        for s in &mut model.syms[..i] {
            s.cumfreq += 8;
        }
        if model.syms[0].cumfreq > RESCALE_THRESHOLD {
            model.rescale();
        }

        loop {
            if (self.l & 0x8000) != (self.h & 0x8000) {
                if (self.l & 0x4000) != 0 && (self.h & 0x4000) == 0 {
                    // Underflow: drop the second-highest bit.
                    self.c ^= 0x4000;
                    self.l &= 0x3FFF;
                    self.h |= 0x4000;
                } else {
                    break;
                }
            }
            self.l <<= 1;
            self.h = (self.h << 1) | 1;
            self.c = (self.c << 1) | bits.read_bits(1) as u16;
        }

        Ok(sym)
    }
}

/// Stateful Quantum decoder for one compression group.
pub struct QuantumDecoder {
    window: Vec<u8>,
    window_pos: usize,
    literals: [Model; 4],
    match3: Model,
    match4: Model,
    match_var: Model,
    match_len: Model,
    selector: Model,
}

impl QuantumDecoder {
    /// Create a decoder for a `2^window_bits` byte window.
    pub fn new(window_bits: u8) -> Result<Self> {
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits) {
            return Err(Error::UnsupportedCompression(
                0x0002 | (window_bits as u16) << 8,
            ));
        }
        let slots = window_bits as usize * 2;
        Ok(Self {
            window: vec![0; 1 << window_bits],
            window_pos: 0,
            literals: [
                Model::new(0, 64),
                Model::new(64, 64),
                Model::new(128, 64),
                Model::new(192, 64),
            ],
            match3: Model::new(0, slots.min(24)),
            match4: Model::new(0, slots.min(36)),
            match_var: Model::new(0, slots),
            match_len: Model::new(0, 27),
            selector: Model::new(0, 7),
        })
    }

    /// Decode the next block into exactly `out_len` bytes.
    pub fn decompress_block(&mut self, data: &[u8], out_len: usize) -> Result<Vec<u8>> {
        let mut bits = BitReader::new(data);
        let mut coder = Coder::start(&mut bits);
        let mask = self.window.len() - 1;
        let mut out = Vec::with_capacity(out_len);

        while out.len() < out_len {
            let selector = coder.decode(&mut self.selector, &mut bits)?;
            let (offset, length) = match selector {
                0..=3 => {
                    let model = &mut self.literals[selector as usize];
                    let byte = coder.decode(model, &mut bits)? as u8;
                    self.window[self.window_pos] = byte;
                    self.window_pos = (self.window_pos + 1) & mask;
                    out.push(byte);
                    continue;
                }
                4 => (position(coder.decode(&mut self.match3, &mut bits)?, &mut bits)?, 3),
                5 => (position(coder.decode(&mut self.match4, &mut bits)?, &mut bits)?, 4),
                6 => {
                    let slot = coder.decode(&mut self.match_len, &mut bits)? as usize;
                    if slot >= LENGTH_BASE.len() {
                        return Err(Error::Quantum);
                    }
                    let length = LENGTH_BASE[slot] as usize
                        + bits.read_many_bits(LENGTH_EXTRA[slot] as u32) as usize
                        + 5;
                    let position_slot = coder.decode(&mut self.match_var, &mut bits)?;
                    let offset = position(position_slot, &mut bits)?;
                    (offset, length)
                }
                _ => return Err(Error::Quantum),
            };

            if offset > self.window.len() {
                return Err(Error::Quantum);
            }
            let mut src = (self.window_pos + self.window.len() - offset) & mask;
            for _ in 0..length.min(out_len - out.len()) {
                let byte = self.window[src];
                self.window[self.window_pos] = byte;
                out.push(byte);
                src = (src + 1) & mask;
                self.window_pos = (self.window_pos + 1) & mask;
            }
        }

        Ok(out)
    }
}

/// Turn a position slot into a match offset.
fn position(slot: u16, bits: &mut BitReader<'_>) -> Result<usize> {
    let slot = slot as usize;
    if slot >= POSITION_BASE.len() {
        return Err(Error::Quantum);
    }
    let extra = bits.read_many_bits(POSITION_EXTRA[slot] as u32);
    Ok((POSITION_BASE[slot] + extra + 1) as usize)
}
