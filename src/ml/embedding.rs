// ============================================================
// Layer 5 — Embedding Store
// ============================================================
// Item and position tables. Two interchangeable storages:
//
//   RawMatrix     — a bare Param<Tensor<B, 2>>; lookup is a gather
//                   and every row, padding included, gets gradient.
//
//   IndexedTable  — Burn's Embedding module plus an optional padding
//                   index. The padding row is returned as stored, but
//                   its gradient is blocked.
//
// Downstream code only calls `lookup(ids)` and never matches on the
// variant.

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig, Initializer},
    prelude::*,
    tensor::{module::embedding, Distribution},
};

use crate::domain::options::EmbeddingRepr;

/// Which table a lookup reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Item,
    Position,
}

impl TableKind {
    pub fn name(self) -> &'static str {
        match self {
            TableKind::Item     => "item",
            TableKind::Position => "position",
        }
    }
}

/// Burn `Embedding` with an optional padding row.
#[derive(Module, Debug)]
pub struct IndexedTable<B: Backend> {
    pub table:       Embedding<B>,
    pub padding_idx: Option<usize>,
}

impl<B: Backend> IndexedTable<B> {
    fn lookup(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let out = self.table.forward(ids.clone());
        let Some(pad) = self.padding_idx else {
            return out;
        };

        // Padded slots are re-read from detached weights so the padding
        // row never accumulates gradient. Forward values are unchanged.
        let [_, _, dim] = out.dims();
        let frozen   = embedding(self.table.weight.val().detach(), ids.clone());
        let pad_mask = ids
            .equal_elem(pad as i64)
            .unsqueeze_dim::<3>(2)
            .repeat_dim(2, dim);
        out.mask_where(pad_mask, frozen)
    }
}

/// Item or position embedding storage.
#[derive(Module, Debug)]
pub enum EmbeddingStore<B: Backend> {
    RawMatrix(Param<Tensor<B, 2>>),
    IndexedTable(IndexedTable<B>),
}

impl<B: Backend> EmbeddingStore<B> {
    /// Build a `num_embeddings x dim` table drawn from N(0, 1).
    pub fn new(
        repr:           EmbeddingRepr,
        num_embeddings: usize,
        dim:            usize,
        padding_idx:    Option<usize>,
        device:         &B::Device,
    ) -> Self {
        match repr {
            EmbeddingRepr::RawMatrix => {
                let weight = Tensor::random(
                    [num_embeddings, dim],
                    Distribution::Normal(0.0, 1.0),
                    device,
                );
                Self::RawMatrix(Param::from_tensor(weight))
            }
            EmbeddingRepr::IndexedTable => {
                let table = EmbeddingConfig::new(num_embeddings, dim)
                    .with_initializer(Initializer::Normal { mean: 0.0, std: 1.0 })
                    .init(device);
                Self::IndexedTable(IndexedTable { table, padding_idx })
            }
        }
    }

    pub fn repr(&self) -> EmbeddingRepr {
        match self {
            Self::RawMatrix(_)    => EmbeddingRepr::RawMatrix,
            Self::IndexedTable(_) => EmbeddingRepr::IndexedTable,
        }
    }

    /// The current table values, still attached to the autodiff graph.
    pub fn weight(&self) -> Tensor<B, 2> {
        match self {
            Self::RawMatrix(weight) => weight.val(),
            Self::IndexedTable(t)   => t.table.weight.val(),
        }
    }

    pub fn num_embeddings(&self) -> usize { self.weight().dims()[0] }

    pub fn dim(&self) -> usize { self.weight().dims()[1] }

    pub fn device(&self) -> B::Device { self.weight().device() }

    /// Gather rows for a [batch, seq] id tensor → [batch, seq, dim].
    pub fn lookup(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        match self {
            Self::RawMatrix(weight) => embedding(weight.val(), ids),
            Self::IndexedTable(t)   => t.lookup(ids),
        }
    }

    /// Re-wrap the same weights (same parameter) in another representation.
    pub fn into_repr(self, repr: EmbeddingRepr, padding_idx: Option<usize>) -> Self {
        let weight = match self {
            Self::RawMatrix(weight) => weight,
            Self::IndexedTable(t)   => t.table.weight,
        };
        match repr {
            EmbeddingRepr::RawMatrix => Self::RawMatrix(weight),
            EmbeddingRepr::IndexedTable => {
                let value    = weight.val();
                let [n, dim] = value.dims();
                let mut table = EmbeddingConfig::new(n, dim).init(&value.device());
                table.weight = weight;
                Self::IndexedTable(IndexedTable { table, padding_idx })
            }
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn row(data: &[f32], dim: usize, r: usize) -> &[f32] {
        &data[r * dim..(r + 1) * dim]
    }

    #[test]
    fn test_lookup_gathers_rows() {
        let device = Default::default();
        for repr in [EmbeddingRepr::RawMatrix, EmbeddingRepr::IndexedTable] {
            let store = EmbeddingStore::<TestBackend>::new(repr, 6, 4, Some(0), &device);
            assert_eq!(store.repr(), repr);
            assert_eq!(store.num_embeddings(), 6);
            assert_eq!(store.dim(), 4);

            let ids = Tensor::<TestBackend, 2, Int>::from_ints([[0, 5, 2]], &device);
            let out = store.lookup(ids);
            assert_eq!(out.dims(), [1, 3, 4]);

            let table = store.weight().into_data().to_vec::<f32>().unwrap();
            let got   = out.into_data().to_vec::<f32>().unwrap();
            assert_eq!(row(&got, 4, 0), row(&table, 4, 0));
            assert_eq!(row(&got, 4, 1), row(&table, 4, 5));
            assert_eq!(row(&got, 4, 2), row(&table, 4, 2));
        }
    }

    #[test]
    fn test_conversion_keeps_weights() {
        let device  = Default::default();
        let indexed = EmbeddingStore::<TestBackend>::new(
            EmbeddingRepr::IndexedTable, 5, 3, Some(0), &device,
        );
        let before = indexed.weight().into_data();
        let raw    = indexed.into_repr(EmbeddingRepr::RawMatrix, None);
        assert_eq!(raw.repr(), EmbeddingRepr::RawMatrix);
        assert_eq!(raw.weight().into_data(), before);

        let back = raw.into_repr(EmbeddingRepr::IndexedTable, Some(0));
        assert_eq!(back.repr(), EmbeddingRepr::IndexedTable);
        assert_eq!(back.weight().into_data(), before);
    }

    #[test]
    fn test_padding_row_gradient_depends_on_repr() {
        let device = Default::default();
        let ids    = [[0, 1, 0, 2]];

        // Indexed table: padding row gets nothing, row 1 gets ones
        let store = EmbeddingStore::<TestAutodiffBackend>::new(
            EmbeddingRepr::IndexedTable, 4, 3, Some(0), &device,
        );
        let out   = store.lookup(Tensor::from_ints(ids, &device));
        let grads = out.sum().backward();
        let grad  = store.weight().grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(row(&grad, 3, 0), &[0.0, 0.0, 0.0]);
        assert_eq!(row(&grad, 3, 1), &[1.0, 1.0, 1.0]);
        assert_eq!(row(&grad, 3, 3), &[0.0, 0.0, 0.0]);

        // Raw matrix: padding row is an ordinary row (used twice)
        let store = EmbeddingStore::<TestAutodiffBackend>::new(
            EmbeddingRepr::RawMatrix, 4, 3, None, &device,
        );
        let out   = store.lookup(Tensor::from_ints(ids, &device));
        let grads = out.sum().backward();
        let grad  = store.weight().grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(row(&grad, 3, 0), &[2.0, 2.0, 2.0]);
        assert_eq!(row(&grad, 3, 2), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_padding_forward_value_is_stored_row() {
        let device = Default::default();
        let store  = EmbeddingStore::<TestAutodiffBackend>::new(
            EmbeddingRepr::IndexedTable, 4, 2, Some(0), &device,
        );
        let out   = store.lookup(Tensor::from_ints([[0]], &device));
        let table = store.weight().into_data().to_vec::<f32>().unwrap();
        let got   = out.into_data().to_vec::<f32>().unwrap();
        assert_eq!(got.as_slice(), row(&table, 2, 0));
    }
}
