//! Rank Allocator
//!
//! Pure rank arithmetic. Neighbour slices are always given nearest first, as
//! returned by a neighbour query in the direction of travel. "Above" means
//! toward the top of the list (smaller ranks), whose virtual boundary is `0`;
//! "below" pads with one step past the nearest neighbour.

use crate::domain::errors::RankError;
use crate::domain::value_objects::{NewItemPlacement, Rank};

/// Rank placing a record between its upper and lower neighbour.
///
/// `above` is the neighbour toward the top of the list, `below` the one
/// toward the bottom. Either may be missing at a boundary.
pub fn rank_between(above: Option<Rank>, below: Option<Rank>, step: Rank) -> Result<Rank, RankError> {
    match (above, below) {
        (Some(above), Some(below)) => Ok(above.midpoint(below)),
        (None, nearest) => Ok(rank_above_boundary(nearest, step)),
        (Some(nearest), None) => rank_below_boundary(Some(nearest), step),
    }
}

/// Rank above the topmost record, or the anchor rank of an empty partition.
pub fn rank_above_boundary(nearest: Option<Rank>, step: Rank) -> Rank {
    match nearest {
        Some(nearest) => nearest.half(),
        None => step.half(),
    }
}

/// Rank below the bottommost record: halfway to one step past it.
pub fn rank_below_boundary(nearest: Option<Rank>, step: Rank) -> Result<Rank, RankError> {
    match nearest {
        Some(nearest) => Ok(nearest.midpoint(one_step_past(nearest, step)?)),
        None => Ok(step.half()),
    }
}

fn one_step_past(rank: Rank, step: Rank) -> Result<Rank, RankError> {
    rank.checked_add(step)
        .ok_or(RankError::RankOverflow("padding below the lowest record"))
}

/// Rank directly above a reference record.
///
/// `neighbours` are distinct ranks `<=` the reference, nearest first, so the
/// first entry is the reference's own rank. `None` when there is nothing to
/// place relative to.
pub fn rank_above_reference(neighbours: &[Rank]) -> Option<Rank> {
    let reference = *neighbours.first()?;
    let upper = neighbours.get(1).copied().unwrap_or(Rank::ZERO);
    Some(reference.midpoint(upper))
}

/// Rank directly below a reference record; mirror of [`rank_above_reference`].
pub fn rank_below_reference(neighbours: &[Rank], step: Rank) -> Result<Option<Rank>, RankError> {
    let Some(&reference) = neighbours.first() else {
        return Ok(None);
    };
    let lower = match neighbours.get(1) {
        Some(&lower) => lower,
        None => one_step_past(reference, step)?,
    };
    Ok(Some(reference.midpoint(lower)))
}

/// Rank moving a record `count` places toward the top.
///
/// `neighbours` are the records strictly above, nearest first, fetched with
/// limit `count + 1`. A short list clamps the move at the top of the list.
pub fn rank_moving_up(neighbours: &[Rank], count: usize) -> Option<Rank> {
    if count == 0 || neighbours.is_empty() {
        return None;
    }
    let boundary = count.min(neighbours.len());
    let passed = neighbours[boundary - 1];
    let next = neighbours.get(boundary).copied().unwrap_or(Rank::ZERO);
    Some(passed.midpoint(next))
}

/// Rank moving a record `count` places toward the bottom.
pub fn rank_moving_down(neighbours: &[Rank], count: usize, step: Rank) -> Result<Option<Rank>, RankError> {
    if count == 0 || neighbours.is_empty() {
        return Ok(None);
    }
    let boundary = count.min(neighbours.len());
    let passed = neighbours[boundary - 1];
    let next = match neighbours.get(boundary) {
        Some(&next) => next,
        None => one_step_past(passed, step)?,
    };
    Ok(Some(passed.midpoint(next)))
}

/// Rank for a record created without one.
///
/// `highest` and `lowest` are the current extremes of the partition.
pub fn new_item_rank(
    policy: NewItemPlacement,
    highest: Option<Rank>,
    lowest: Option<Rank>,
    step: Rank,
) -> Result<Option<Rank>, RankError> {
    match policy {
        NewItemPlacement::Highest => Ok(Some(rank_above_boundary(highest, step))),
        NewItemPlacement::Lowest => rank_below_boundary(lowest, step).map(Some),
        NewItemPlacement::Unranked => Ok(None),
    }
}
