//! Code-pair accumulation interpolation table.
//!
//! Between a past field and a future field, substep `k` (slot `k - 1`)
//! accumulates a linear blend of the two codes' accumulations, weighted
//! `k / substeps` towards the future. Precomputing the blend for every code
//! pair keeps floating point out of the member sweep entirely.
//!
//! Memory: `codes² × (substeps − 1)` entries of 4 bytes, about 63 MB for the
//! default 0.1 dBZ code scale and 10 substeps.

use rayon::prelude::*;
use tracing::debug;

use crate::codes::{Accum, Code, CodeTables};

/// `[past code][future code][slot]` → accumulation of that substep.
#[derive(Debug, Clone)]
pub struct AccumulationLut {
    codes: usize,
    slots: usize,
    table: Vec<Accum>,
}

impl AccumulationLut {
    /// Build the table for `substeps` interpolation substeps.
    pub fn build(tables: &CodeTables, substeps: u32) -> Self {
        let codes = tables.code_count();
        let slots = substeps.saturating_sub(1) as usize;
        let nodata = tables.nodata_code().index();
        let n = substeps as f64;

        let mut table = vec![Accum::NODATA; codes * codes * slots];

        if slots > 0 {
            // One row per past code; mirrored entries are computed from the
            // same (low, high) ordering so the symmetry holds bit for bit.
            table
                .par_chunks_mut(codes * slots)
                .enumerate()
                .for_each(|(c0, row)| {
                    if c0 == nodata {
                        return;
                    }
                    for c1 in 0..codes {
                        if c1 == nodata {
                            continue;
                        }
                        let cell = &mut row[c1 * slots..(c1 + 1) * slots];
                        for (slot, value) in cell.iter_mut().enumerate() {
                            *value = if c0 <= c1 {
                                blend(tables, c0, c1, slot, n)
                            } else {
                                blend(tables, c1, c0, slots - 1 - slot, n)
                            };
                        }
                    }
                });
        }

        debug!(codes, slots, entries = table.len(), "Built accumulation interpolation table");

        Self { codes, slots, table }
    }

    /// Number of codes per axis, including the nodata code.
    pub fn codes(&self) -> usize {
        self.codes
    }

    /// Number of substep slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Accumulation of substep slot `slot` between `past` and `future`.
    #[inline]
    pub fn get(&self, past: Code, future: Code, slot: usize) -> Accum {
        debug_assert!(slot < self.slots);
        self.table
            .get((past.index() * self.codes + future.index()) * self.slots + slot)
            .copied()
            .unwrap_or(Accum::NODATA)
    }
}

/// `acc(lo) + (acc(hi) − acc(lo)) · (slot + 1) / n`, truncated.
#[inline]
fn blend(tables: &CodeTables, lo: usize, hi: usize, slot: usize, n: f64) -> Accum {
    let a0 = tables.accumulation(Code::new(lo as u16)).raw();
    if lo == hi {
        return Accum::from_f64(a0 as f64);
    }
    let a1 = tables.accumulation(Code::new(hi as u16)).raw();
    let k = (a1 - a0) as f64 / n;
    Accum::from_f64(a0 as f64 + k * (slot + 1) as f64)
}
