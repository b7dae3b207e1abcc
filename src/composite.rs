//! Composition wiring: settle a parent promise by observing erased
//! children.
//!
//! The parent owns nothing of its children beyond an always-observer on
//! each; the only cross-child state is the `remaining` counter of the
//! all-combinator. Settlement races between children are serialized by the
//! parent's own single-assignment gate, so exactly one child's outcome is
//! honored and the rest are dropped (and logged) by `settle_quietly`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::PromiseError;
use crate::outcome::Outcome;
use crate::promise::Promise;
use crate::Joinable;

/// Complete when every child succeeds; fail fast on the first child
/// failure. An empty set completes immediately.
pub(crate) fn wire_all(
    parent: &Promise<()>,
    children: &[Box<dyn Joinable>],
) -> Result<(), PromiseError> {
    if children.is_empty() {
        return parent.resolve(());
    }
    let remaining = Arc::new(AtomicUsize::new(children.len()));
    for child in children {
        let parent = parent.clone();
        let remaining = Arc::clone(&remaining);
        child.on_settled(Box::new(move |settled| match settled {
            Err(cause) => parent.settle_quietly(Outcome::Failure(cause.clone())),
            Ok(()) => {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    parent.settle_quietly(Outcome::success(()));
                }
            }
        }))?;
    }
    Ok(())
}

/// Mirror the first settlement, success or failure. An empty set never
/// completes.
pub(crate) fn wire_any(
    parent: &Promise<()>,
    children: &[Box<dyn Joinable>],
) -> Result<(), PromiseError> {
    for child in children {
        let parent = parent.clone();
        child.on_settled(Box::new(move |settled| {
            parent.settle_quietly(match settled {
                Ok(()) => Outcome::success(()),
                Err(cause) => Outcome::Failure(cause.clone()),
            })
        }))?;
    }
    Ok(())
}

/// Make the composite invokable iff every child is: its invocation then
/// invokes each child in order.
pub(crate) fn adopt_invoker(parent: &Promise<()>, children: Vec<Box<dyn Joinable>>) {
    if children.is_empty() || !children.iter().all(|child| child.is_invokable()) {
        return;
    }
    parent.defer_invocation(Box::new(move |_| {
        for child in &children {
            child.invoke_erased()?;
        }
        Ok(())
    }));
}
