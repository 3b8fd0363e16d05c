//! Trees, branches, leaves and baskets.
//!
//! A [`Tree`] is read from its key like any other record. Its branches keep a
//! handle to the file so their baskets can be decoded later, in any order and
//! from any thread.

mod basket;
mod branch;
mod leaf;
mod ttree;

pub use basket::{BasketData, BasketHeader, EmbeddedBasket};
pub use branch::{
    BasketLocation, BasketSpan, Branch, ElementInfo, MIN_BRANCH_ELEMENT_VERSION, MIN_BRANCH_VERSION,
};
pub use leaf::{element_dtype, Leaf, LeafKind};
pub use ttree::{Tree, MIN_TREE_VERSION};

use crate::object::ClassRegistry;
use std::sync::Arc;

macro_rules! register_leaves {
    ($registry:expr, $($class:literal => $kind:expr),* $(,)?) => {
        $(
            $registry.register_fn($class, |cursor, ctx| Ok(Arc::new(Leaf::read($kind, cursor, ctx)?)));
        )*
    };
}

/// Adds the tree classes to a registry.
pub fn register_classes(registry: &mut ClassRegistry) {
    registry.register_fn("TTree", |cursor, ctx| Ok(Arc::new(Tree::read(cursor, ctx)?)));
    registry.register_fn("TBranch", |cursor, ctx| Ok(Arc::new(Branch::read(cursor, ctx)?)));
    registry.register_fn("TBranchElement", |cursor, ctx| {
        Ok(Arc::new(Branch::read_element(cursor, ctx)?))
    });
    registry.register_fn("TBasket", |cursor, ctx| Ok(Arc::new(EmbeddedBasket::read(cursor, ctx)?)));
    register_leaves!(registry,
        "TLeafO" => LeafKind::Bool,
        "TLeafB" => LeafKind::Byte,
        "TLeafS" => LeafKind::Short,
        "TLeafI" => LeafKind::Int,
        "TLeafL" => LeafKind::Long,
        "TLeafF" => LeafKind::Float,
        "TLeafD" => LeafKind::Double,
        "TLeafC" => LeafKind::Char,
        "TLeafElement" => LeafKind::Element { id: 0, ty: 0 },
    );
}
