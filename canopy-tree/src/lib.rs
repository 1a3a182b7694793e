//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod defaults;
pub mod diff;
pub mod path;
pub mod serialize;
pub mod tree;
pub mod validate;

pub use tree::{ConfigTree, Node, NodeFlags, NodeId, NodeKind};
