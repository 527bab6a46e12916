//! Grouping scheduler for bottom-up reduction rounds.
//!
//! Each round splits the current list of nodes into consecutive groups of
//! `group_size`. Leftover items are absorbed by the later groups (one extra
//! item per group, last group first), so a round never produces a lonely
//! single-item group unless the whole list is shorter than `group_size`.

/// Split `items` into ordered groups of near-equal size.
///
/// - empty input → no groups
/// - fewer than `group_size` items → one group holding everything
/// - otherwise `len / group_size` groups, the remainder spread from the
///   last group backward
///
/// Concatenating the groups reproduces `items` in order.
pub fn split_groups<T>(items: Vec<T>, group_size: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    if group_size == 0 {
        return vec![items];
    }

    let sizes = group_sizes(items.len(), group_size);
    let mut rest = items.into_iter();
    sizes
        .into_iter()
        .map(|size| rest.by_ref().take(size).collect())
        .collect()
}

/// Group sizes `split_groups` would produce for `len` items.
pub fn group_sizes(len: usize, group_size: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let num_groups = if group_size == 0 { 0 } else { len / group_size };
    if num_groups == 0 {
        return vec![len];
    }

    let mut sizes = vec![group_size; num_groups];
    let mut remainder = len % group_size;
    while remainder > 0 {
        for size in sizes.iter_mut().rev() {
            if remainder == 0 {
                break;
            }
            *size += 1;
            remainder -= 1;
        }
    }
    sizes
}

/// Node counts after each reduction round, starting from `leaves`.
///
/// `[6]` leaves with pairs gives `[3, 1]`; a single leaf needs no rounds.
pub fn round_sizes(leaves: usize, group_size: usize) -> Vec<usize> {
    let mut rounds = Vec::new();
    let mut remaining = leaves;
    // group_size < 2 never shrinks the list; the builder rejects it up front
    if group_size < 2 {
        return rounds;
    }
    while remaining > 1 {
        remaining = group_sizes(remaining, group_size).len();
        rounds.push(remaining);
    }
    rounds
}

/// Total summarizer calls a full build makes: one per leaf plus one per
/// group in every reduction round.
///
/// Six leaves in pairs: `6 + 3 + 1 = 10`. Five: `5 + 2 + 1 = 8`.
pub fn inference_count(leaves: usize, group_size: usize) -> usize {
    leaves + round_sizes(leaves, group_size).iter().sum::<usize>()
}
