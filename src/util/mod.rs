//! Internal building blocks.

pub(crate) mod arena;
pub(crate) mod backoff;

pub(crate) use arena::{Arena, ArenaIndex};
pub(crate) use backoff::Backoff;
