//! Work decomposition shared by the backends: the two-stage tiled reduction
//! and the two-phase filter compaction.
//!
//! Collection lengths are only known on the device side, so the builders here
//! produce kernel statements over symbolic lengths. [`TilePlan`],
//! [`simulate_reduce`] and [`simulate_filter`] model the same loops on the host
//! and pin down how many elements each stage touches.

use std::ops::Range;

use crate::codegen::kernel_ast::{KExpr, KStmt, KType};

/// Exact integer square root.
pub fn isqrt(n: usize) -> usize {
    if n < 2 {
        return n;
    }
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}

/// `⌊√N⌋` tiles of `⌊√N⌋` elements followed by the leftover tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlan {
    pub length: usize,
    pub tiles: usize,
    pub tile_size: usize,
}

impl TilePlan {
    pub fn for_length(length: usize) -> Self {
        let root = isqrt(length);
        Self {
            length,
            tiles: root,
            tile_size: root,
        }
    }

    pub fn covered(&self) -> usize {
        self.tiles * self.tile_size
    }

    pub fn remainder(&self) -> usize {
        self.length - self.covered()
    }

    pub fn tile(&self, tile: usize) -> Range<usize> {
        let start = tile * self.tile_size;
        start..start + self.tile_size
    }

    pub fn tail(&self) -> Range<usize> {
        self.covered()..self.length
    }
}

/// `acc = f(acc, next)` for every index in `from..to`.
fn fold_loop(
    acc: &str,
    index: &str,
    from: KExpr,
    to: KExpr,
    next: &dyn Fn(KExpr) -> KExpr,
    combine: &dyn Fn(KExpr, KExpr) -> KExpr,
) -> KStmt {
    let value = next(KExpr::ident(index));
    KStmt::counted_for(
        index,
        from,
        to,
        vec![KStmt::expr(KExpr::assign(
            KExpr::ident(acc),
            combine(KExpr::ident(acc), value),
        ))],
    )
}

/// Stage 1: fold the elements of `tile` into one partial result.
pub fn tile_fold(
    ty: &KType,
    tile: KExpr,
    tile_size: KExpr,
    read: &dyn Fn(KExpr) -> KExpr,
    combine: &dyn Fn(KExpr, KExpr) -> KExpr,
    finish: &dyn Fn(KExpr) -> KStmt,
) -> Vec<KStmt> {
    let base = KExpr::binary(tile, "*", tile_size.clone());
    vec![
        KStmt::decl(KType::int(), "base", base),
        KStmt::decl(ty.clone(), "acc", read(KExpr::ident("base"))),
        fold_loop(
            "acc",
            "i",
            KExpr::Int(1),
            tile_size,
            &|i| read(KExpr::binary(KExpr::ident("base"), "+", i)),
            combine,
        ),
        finish(KExpr::ident("acc")),
    ]
}

/// Stage 2: fold every tile partial, then the tail past `tiles * tile_size`.
#[allow(clippy::too_many_arguments)]
pub fn partials_fold(
    ty: &KType,
    tiles: KExpr,
    tile_size: KExpr,
    length: KExpr,
    read_partial: &dyn Fn(KExpr) -> KExpr,
    read: &dyn Fn(KExpr) -> KExpr,
    combine: &dyn Fn(KExpr, KExpr) -> KExpr,
    finish: &dyn Fn(KExpr) -> KStmt,
) -> Vec<KStmt> {
    vec![
        KStmt::decl(ty.clone(), "acc", read_partial(KExpr::Int(0))),
        fold_loop("acc", "i", KExpr::Int(1), tiles.clone(), read_partial, combine),
        fold_loop(
            "acc",
            "j",
            KExpr::binary(tiles, "*", tile_size),
            length,
            read,
            combine,
        ),
        finish(KExpr::ident("acc")),
    ]
}

/// Single-worker left fold over the whole collection.
pub fn linear_fold(
    ty: &KType,
    length: KExpr,
    read: &dyn Fn(KExpr) -> KExpr,
    combine: &dyn Fn(KExpr, KExpr) -> KExpr,
    finish: &dyn Fn(KExpr) -> KStmt,
) -> Vec<KStmt> {
    vec![
        KStmt::decl(ty.clone(), "acc", read(KExpr::Int(0))),
        fold_loop("acc", "i", KExpr::Int(1), length, read, combine),
        finish(KExpr::ident("acc")),
    ]
}

/// Filter phase 1: record the element index when the predicate holds, -1
/// otherwise, counting matches.
pub fn mark_matches(
    predicate: KExpr,
    index: KExpr,
    increment: KStmt,
    finish: &dyn Fn(KExpr) -> KStmt,
) -> Vec<KStmt> {
    vec![KStmt::If {
        condition: predicate,
        then_body: vec![increment, finish(index)],
        else_body: Some(vec![finish(KExpr::Int(-1))]),
    }]
}

/// Filter phase 2: copy marked elements to the front of the output in order.
pub fn compact_matches(
    length: KExpr,
    read_index: &dyn Fn(KExpr) -> KExpr,
    copy: &dyn Fn(KExpr, KExpr) -> KStmt,
) -> Vec<KStmt> {
    let marked = KExpr::binary(read_index(KExpr::ident("i")), "!=", KExpr::Int(-1));
    vec![
        KStmt::decl(KType::int(), "k", KExpr::Int(0)),
        KStmt::counted_for(
            "i",
            KExpr::Int(0),
            length,
            vec![KStmt::If {
                condition: marked,
                then_body: vec![
                    copy(KExpr::ident("k"), KExpr::ident("i")),
                    KStmt::expr(KExpr::post_inc(KExpr::ident("k"))),
                ],
                else_body: None,
            }],
        ),
    ]
}

/// What a tiled reduction touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTrace<T> {
    pub result: Option<T>,
    pub stage_one_items: usize,
    pub partials_folded: usize,
    pub tail_folded: usize,
    /// How many times each input element was read.
    pub reads: Vec<usize>,
}

/// Host model of [`tile_fold`] followed by [`partials_fold`].
pub fn simulate_reduce<T: Clone>(items: &[T], combine: impl Fn(&T, &T) -> T) -> ReduceTrace<T> {
    let plan = TilePlan::for_length(items.len());
    let mut reads = vec![0; items.len()];
    if items.is_empty() {
        return ReduceTrace {
            result: None,
            stage_one_items: 0,
            partials_folded: 0,
            tail_folded: 0,
            reads,
        };
    }
    let mut partials = Vec::with_capacity(plan.tiles);
    for tile in 0..plan.tiles {
        let range = plan.tile(tile);
        reads[range.start] += 1;
        let mut acc = items[range.start].clone();
        for i in range.start + 1..range.end {
            reads[i] += 1;
            acc = combine(&acc, &items[i]);
        }
        partials.push(acc);
    }
    let mut acc = partials[0].clone();
    for partial in &partials[1..] {
        acc = combine(&acc, partial);
    }
    for j in plan.tail() {
        reads[j] += 1;
        acc = combine(&acc, &items[j]);
    }
    ReduceTrace {
        result: Some(acc),
        stage_one_items: plan.tiles,
        partials_folded: partials.len(),
        tail_folded: plan.remainder(),
        reads,
    }
}

/// What a two-phase filter produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTrace<T> {
    pub marks: Vec<i64>,
    pub count: usize,
    pub output: Vec<T>,
    pub phase_two_ran: bool,
}

/// Host model of [`mark_matches`], the count copy and [`compact_matches`].
pub fn simulate_filter<T: Clone>(items: &[T], predicate: impl Fn(&T) -> bool) -> FilterTrace<T> {
    let mut count = 0;
    let marks: Vec<i64> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if predicate(item) {
                count += 1;
                i as i64
            } else {
                -1
            }
        })
        .collect();
    let mut output = Vec::new();
    let phase_two_ran = count > 0;
    if phase_two_ran {
        output.reserve(count);
        for (i, mark) in marks.iter().enumerate() {
            if *mark != -1 {
                output.push(items[i].clone());
            }
        }
    }
    FilterTrace {
        marks,
        count,
        output,
        phase_two_ran,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isqrt() {
        for n in 0..2000usize {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({}) = {}", n, r);
        }
        assert_eq!(isqrt(1 << 40), 1 << 20);
    }

    #[test]
    fn test_plan_shape() {
        let plan = TilePlan::for_length(10);
        assert_eq!((plan.tiles, plan.tile_size, plan.remainder()), (3, 3, 1));
        assert_eq!(plan.tile(2), 6..9);
        assert_eq!(plan.tail(), 9..10);
        assert_eq!(TilePlan::for_length(16).remainder(), 0);
    }

    #[test]
    fn test_reduce_reads_each_element_once() {
        for n in 1..300usize {
            let items: Vec<u64> = (0..n as u64).collect();
            let trace = simulate_reduce(&items, |a, b| a + b);
            let root = isqrt(n);
            assert_eq!(trace.stage_one_items, root);
            assert_eq!(trace.partials_folded, root);
            assert_eq!(trace.tail_folded, n - root * root);
            assert!(trace.reads.iter().all(|&r| r == 1), "n = {}", n);
            assert_eq!(trace.result, Some(items.iter().sum()));
        }
    }

    #[test]
    fn test_reduce_keeps_left_to_right_order() {
        let items: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let trace = simulate_reduce(&items, |a, b| format!("{}{}", a, b));
        assert_eq!(trace.result.as_deref(), Some("012345678910"));
    }

    #[test]
    fn test_reduce_of_empty_collection() {
        let trace = simulate_reduce::<i32>(&[], |a, b| a + b);
        assert_eq!(trace.result, None);
        assert_eq!(trace.stage_one_items, 0);
    }

    #[test]
    fn test_filter_all_false_skips_phase_two() {
        let items = [1, 2, 3, 4];
        let trace = simulate_filter(&items, |_| false);
        assert_eq!(trace.count, 0);
        assert!(trace.output.is_empty());
        assert!(!trace.phase_two_ran);
        assert_eq!(trace.marks, vec![-1; 4]);
    }

    #[test]
    fn test_filter_preserves_order() {
        let items = [5, 8, 1, 12, 7, 10];
        let trace = simulate_filter(&items, |x| x % 2 == 0);
        assert_eq!(trace.count, 3);
        assert_eq!(trace.output, vec![8, 12, 10]);
        assert_eq!(trace.marks, vec![-1, 1, -1, 3, -1, 5]);
        assert!(trace.phase_two_ran);
    }

    #[test]
    fn test_partials_fold_walks_partials_then_tail() {
        let stmts = partials_fold(
            &KType::int(),
            KExpr::ident("tiles"),
            KExpr::ident("size"),
            KExpr::ident("n"),
            &|i| KExpr::index(KExpr::ident("partial"), i),
            &|i| KExpr::index(KExpr::ident("data"), i),
            &|a, b| KExpr::call("f", vec![a, b]),
            &|acc| KStmt::Return(Some(acc)),
        );
        assert_eq!(stmts.len(), 4);
        match &stmts[2] {
            KStmt::For { init, condition, .. } => {
                assert_eq!(
                    init.as_deref(),
                    Some(&KStmt::decl(
                        KType::int(),
                        "j",
                        KExpr::binary(KExpr::ident("tiles"), "*", KExpr::ident("size"))
                    ))
                );
                assert_eq!(
                    condition.as_ref(),
                    Some(&KExpr::binary(KExpr::ident("j"), "<", KExpr::ident("n")))
                );
            }
            other => panic!("expected tail loop, got {:?}", other),
        }
    }
}
