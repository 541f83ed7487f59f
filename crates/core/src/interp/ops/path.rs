//! Path construction and painting operators.
//!
//! Handles: m, l, c, v, y, h, re, S, s, f, F, f*, B, B*, b, b*, n, W, W*
//!
//! Paths are not built up here: each operator is passed through with its
//! coordinates in user space, and the consumer applies the CTM recorded by
//! the surrounding `Transform` ops.

use crate::error::Result;
use crate::interp::evaluator::{EvalSink, EvaluatorTask};
use crate::interp::operator_list::{OpArg, OpCode};

/// Coordinates taken by each path operator.
const fn coordinate_count(op: OpCode) -> usize {
    match op {
        OpCode::MoveTo | OpCode::LineTo => 2,
        OpCode::CurveTo2 | OpCode::CurveTo3 | OpCode::Rectangle => 4,
        OpCode::CurveTo => 6,
        _ => 0,
    }
}

impl<S: EvalSink> EvaluatorTask<'_, S> {
    /// PDF operators: `m l c v y h re S s f F f* B B* b b* n W W*`
    pub(crate) fn do_path(&mut self, op: OpCode) -> Result<()> {
        let coords = self.operands.pop_nums(coordinate_count(op))?;
        self.emit(op, coords.into_iter().map(OpArg::Num).collect());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EvaluatorOptions;
    use crate::interp::evaluator::{Evaluator, ResourceCache};
    use crate::interp::operator_list::{OpArg, OpCode};
    use crate::test_utils::xref_with;
    use crate::utils::MATRIX_IDENTITY;
    use bytes::Bytes;

    #[test]
    fn test_path_ops_keep_their_coordinates() {
        let xref = xref_with(&[]);
        let cache = ResourceCache::new();
        let options = EvaluatorOptions::default();
        let list = Evaluator::new(&xref, &cache, &options)
            .operator_list(
                &[Bytes::from_static(b"10 20 m 30 40 l 1 2 3 4 5 6 c h 0 0 5 5 re W n f* F")],
                None,
                MATRIX_IDENTITY,
            )
            .unwrap();
        assert_eq!(
            list.fn_array,
            [
                OpCode::MoveTo,
                OpCode::LineTo,
                OpCode::CurveTo,
                OpCode::ClosePath,
                OpCode::Rectangle,
                OpCode::Clip,
                OpCode::EndPath,
                OpCode::EoFill,
                OpCode::Fill,
            ]
        );
        assert_eq!(list.args_array[0], [OpArg::Num(10.0), OpArg::Num(20.0)]);
        assert_eq!(list.args_array[2].len(), 6);
        assert!(list.args_array[3].is_empty());
    }
}
