//! Content stream operator implementations.
//!
//! Operators are grouped by category, each file adding `do_*` methods to
//! `EvaluatorTask`:
//! - `graphics_state` - state stack and transforms (q, Q, cm, w, J, j, M, d, ri, i, gs)
//! - `color` - color spaces and values (G, g, RG, rg, K, k, CS, cs, SC, SCN, sc, scn)
//! - `path` - path construction and painting (m, l, c, v, y, h, re, S, s, f, F, f\*, B, B\*, b, b\*, n, W, W\*)
//! - `text` - text state and showing (BT, ET, Tc, Tw, Tz, TL, Tf, Tr, Ts, Td, TD, Tm, T\*, Tj, TJ, ', ")
//! - `xobject` - XObjects, shadings and inline images (Do, sh, BI/ID/EI)
//! - `marked` - marked content (BMC, BDC, EMC, MP, DP)

mod color;
mod graphics_state;
mod marked;
mod path;
mod text;
mod xobject;
