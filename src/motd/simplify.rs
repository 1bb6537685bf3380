//! Removal of components that have no visible effect.

use std::collections::BTreeSet;

use super::{Formatting, MotdComponent};

/// Repeats every rule until nothing changes, then merges adjacent text.
pub(super) fn simplify(parsed: &[MotdComponent]) -> Vec<MotdComponent> {
    let mut current = parsed.to_vec();
    loop {
        let unused: BTreeSet<usize> = [
            doubled_items(&current),
            overridden_colors(&current),
            formatting_before_color(&current),
            empty_text(&current),
            trailing_non_text(&current),
        ]
        .into_iter()
        .flatten()
        .collect();
        let mut next = without(&current, &unused);

        // computed on the already reduced list so two rules never remove
        // both halves of a pair that only made sense together
        let unused = meaningless_resets_and_colors(&next);
        next = without(&next, &unused);

        if next == current {
            return squash_text(current);
        }
        current = next;
    }
}

fn without(parsed: &[MotdComponent], unused: &BTreeSet<usize>) -> Vec<MotdComponent> {
    parsed
        .iter()
        .enumerate()
        .filter(|(i, _)| !unused.contains(i))
        .map(|(_, c)| c.clone())
        .collect()
}

/// A style or color immediately followed by the same one.
fn doubled_items(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    parsed
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0].is_style_or_color() && pair[0] == pair[1])
        .map(|(i, _)| i)
        .collect()
}

/// A color replaced by another color before any text.
fn overridden_colors(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    let mut unused = BTreeSet::new();
    let mut pending = None;
    for (i, item) in parsed.iter().enumerate() {
        if item.is_color() {
            if let Some(prev) = pending.replace(i) {
                unused.insert(prev);
            }
        } else if matches!(item, MotdComponent::Text(_)) {
            pending = None;
        }
    }
    unused
}

/// Styles followed by a color before any text: the color clears them.
fn formatting_before_color(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    let mut unused = BTreeSet::new();
    let mut collected = Vec::new();
    for (i, item) in parsed.iter().enumerate() {
        match item {
            MotdComponent::Formatting(_) => collected.push(i),
            MotdComponent::Text(_) => collected.clear(),
            item if item.is_color() => unused.extend(collected.drain(..)),
            _ => {}
        }
    }
    unused
}

fn empty_text(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    parsed
        .iter()
        .enumerate()
        .filter(|(_, item)| matches!(item, MotdComponent::Text(t) if t.is_empty()))
        .map(|(i, _)| i)
        .collect()
}

/// Styles and colors after the last text.
fn trailing_non_text(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    parsed
        .iter()
        .enumerate()
        .rev()
        .take_while(|(_, item)| !matches!(item, MotdComponent::Text(_)))
        .filter(|(_, item)| item.is_style_or_color())
        .map(|(i, _)| i)
        .collect()
}

/// Resets with nothing to reset, and colors that are already active.
fn meaningless_resets_and_colors(parsed: &[MotdComponent]) -> BTreeSet<usize> {
    let mut unused = BTreeSet::new();
    let mut color = None;
    let mut styled = false;
    for (i, item) in parsed.iter().enumerate() {
        match item {
            MotdComponent::Formatting(Formatting::Reset) => {
                if color.is_none() && !styled {
                    unused.insert(i);
                }
                color = None;
                styled = false;
            }
            MotdComponent::Formatting(_) => styled = true,
            item if item.is_color() => {
                if color == Some(item) && !styled {
                    unused.insert(i);
                }
                color = Some(item);
                styled = false;
            }
            _ => {}
        }
    }
    unused
}

fn squash_text(parsed: Vec<MotdComponent>) -> Vec<MotdComponent> {
    let mut out: Vec<MotdComponent> = Vec::with_capacity(parsed.len());
    for item in parsed {
        match (out.last_mut(), item) {
            (Some(MotdComponent::Text(prev)), MotdComponent::Text(text)) => prev.push_str(&text),
            (_, item) => out.push(item),
        }
    }
    out
}
