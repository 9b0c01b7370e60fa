//! Pure per-pass scheduling decisions.
//!
//! [`plan_passes`] turns the flattened role sequence into plain data a backend
//! can execute verbatim. Keeping the decisions here makes the scheduling
//! algorithm checkable without a GL context.

use crate::{PassRole, StateTag};

/// Where a pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputBinding {
    /// Off-screen target `slot`, cleared to transparent before the draw.
    Offscreen(usize),
    /// The caller-supplied final destination. Never cleared here; the final
    /// pass owns compositing.
    Destination,
}

/// Where a pass reads its primary input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSelect {
    /// The caller-supplied source texture.
    Source,
    /// The backing texture of off-screen target `slot`.
    Offscreen(usize),
}

/// Which coordinate buffers a pass draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordSelect {
    /// Caller-supplied geometry + texture coordinates (these encode the
    /// source image's actual orientation/rotation).
    Caller,
    /// Canonical quad + unflipped canonical texture coordinates.
    Canonical,
    /// Canonical quad + vertically flipped canonical texture coordinates.
    CanonicalFlipped,
}

/// One scheduled pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStep {
    pub pass: usize,
    pub input: InputSelect,
    pub output: OutputBinding,
    pub coords: CoordSelect,
    /// Off-screen slot holding the saved texture, for a matched blend pass.
    pub secondary: Option<usize>,
    /// True for a blend whose tag has no usable preceding save marker; the
    /// pass degrades to a pass-through.
    pub unmatched_blend: bool,
}

/// Computes the full per-frame schedule for a flattened chain.
///
/// Passes execute strictly in index order. Every non-final pass writes
/// off-screen slot `i`; the final pass writes the destination. Pass 0 reads
/// the caller's source texture, every later pass reads the slot written just
/// before it.
pub fn plan_passes(roles: &[PassRole]) -> Vec<PassStep> {
    let n = roles.len();
    let mut steps = Vec::with_capacity(n);

    for (i, role) in roles.iter().enumerate() {
        let output = if i + 1 < n {
            OutputBinding::Offscreen(i)
        } else {
            OutputBinding::Destination
        };
        let input = if i == 0 {
            InputSelect::Source
        } else {
            InputSelect::Offscreen(i - 1)
        };

        let (secondary, unmatched_blend) = match role {
            PassRole::Blend(tag) => match resolve_blend_source(roles, i, tag) {
                Some(slot) => (Some(slot), false),
                None => (None, true),
            },
            _ => (None, false),
        };

        // Role first: a matched blend composites two already-oriented
        // textures and ignores the positional coordinate rules. An unmatched
        // blend draws as a pass-through, so it must keep them.
        let coords = if secondary.is_some() {
            CoordSelect::Canonical
        } else {
            positional_coords(i, n)
        };

        steps.push(PassStep {
            pass: i,
            input,
            output,
            coords,
            secondary,
            unmatched_blend,
        });
    }

    steps
}

fn positional_coords(i: usize, n: usize) -> CoordSelect {
    if i == 0 {
        CoordSelect::Caller
    } else if i + 1 == n {
        // Each off-screen hop stores its result Y-inverted relative to the
        // source; an even pass count leaves the inversion in place, an odd
        // count cancels it.
        if n % 2 == 0 {
            CoordSelect::CanonicalFlipped
        } else {
            CoordSelect::Canonical
        }
    } else {
        CoordSelect::Canonical
    }
}

/// Resolves which off-screen slot holds the state saved under `tag` for the
/// blend pass at `consumer`.
///
/// Scans backward for the nearest save marker with an equal tag. When the
/// consumer and the marker share index parity, the marker's own slot carries
/// the opposite orientation from the live input, so the slot written just
/// before the marker is selected instead (same image content, matching
/// orientation). Results outside the off-screen range are discarded and the
/// blend is skipped rather than reading an invalid slot.
pub fn resolve_blend_source(roles: &[PassRole], consumer: usize, tag: &StateTag) -> Option<usize> {
    let marker = roles[..consumer]
        .iter()
        .rposition(|r| matches!(r, PassRole::SaveMarker(t) if t == tag))?;

    let slot = if consumer % 2 == marker % 2 {
        marker.checked_sub(1)?
    } else {
        marker
    };

    // Only n - 1 off-screen slots exist.
    let offscreen = roles.len().saturating_sub(1);
    (slot < offscreen).then_some(slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(n: usize) -> Vec<PassRole> {
        vec![PassRole::Plain; n]
    }

    fn tagged(layout: &[(usize, PassRole)], n: usize) -> Vec<PassRole> {
        let mut roles = plain(n);
        for (i, role) in layout {
            roles[*i] = role.clone();
        }
        roles
    }

    #[test]
    fn final_pass_flip_follows_pass_count_parity() {
        // Unflipped, flipped, unflipped, flipped for 1..=4 passes.
        let expect = [
            CoordSelect::Caller,
            CoordSelect::CanonicalFlipped,
            CoordSelect::Canonical,
            CoordSelect::CanonicalFlipped,
        ];
        for (n, want) in (1..=4).zip(expect) {
            let steps = plan_passes(&plain(n));
            assert_eq!(steps.len(), n);
            assert_eq!(steps[n - 1].coords, want, "pass count {n}");
        }
    }

    #[test]
    fn single_pass_draws_source_to_destination_with_caller_coords() {
        let steps = plan_passes(&plain(1));
        assert_eq!(
            steps,
            vec![PassStep {
                pass: 0,
                input: InputSelect::Source,
                output: OutputBinding::Destination,
                coords: CoordSelect::Caller,
                secondary: None,
                unmatched_blend: false,
            }]
        );
    }

    #[test]
    fn passes_chain_offscreen_slots_in_order() {
        let steps = plan_passes(&plain(4));
        for (i, step) in steps.iter().enumerate() {
            if i == 0 {
                assert_eq!(step.input, InputSelect::Source);
            } else {
                assert_eq!(step.input, InputSelect::Offscreen(i - 1));
            }
            if i + 1 < steps.len() {
                assert_eq!(step.output, OutputBinding::Offscreen(i));
            } else {
                assert_eq!(step.output, OutputBinding::Destination);
            }
        }
    }

    #[test]
    fn middle_passes_use_unflipped_canonical_coords() {
        let steps = plan_passes(&plain(5));
        for step in &steps[1..4] {
            assert_eq!(step.coords, CoordSelect::Canonical);
        }
    }

    #[test]
    fn blend_source_uses_marker_slot_on_opposite_parity() {
        let tag = StateTag::new("X");
        // Marker at 2, consumer at 5: parities differ, slot 2 directly.
        let roles = tagged(
            &[
                (2, PassRole::SaveMarker(tag.clone())),
                (5, PassRole::Blend(tag.clone())),
            ],
            6,
        );
        assert_eq!(resolve_blend_source(&roles, 5, &tag), Some(2));
    }

    #[test]
    fn blend_source_steps_back_one_slot_on_shared_parity() {
        let tag = StateTag::new("X");
        // Marker at 2, consumer at 4: same parity, slot 1.
        let roles = tagged(
            &[
                (2, PassRole::SaveMarker(tag.clone())),
                (4, PassRole::Blend(tag.clone())),
            ],
            6,
        );
        assert_eq!(resolve_blend_source(&roles, 4, &tag), Some(1));
    }

    #[test]
    fn blend_source_prefers_nearest_preceding_marker() {
        let tag = StateTag::new("X");
        let roles = tagged(
            &[
                (1, PassRole::SaveMarker(tag.clone())),
                (2, PassRole::SaveMarker(tag.clone())),
                (5, PassRole::Blend(tag.clone())),
            ],
            6,
        );
        // The marker at 2 shadows the one at 1; parities differ at 5.
        assert_eq!(resolve_blend_source(&roles, 5, &tag), Some(2));
    }

    #[test]
    fn blend_source_skips_shared_parity_marker_at_index_zero() {
        let tag = StateTag::new("X");
        let roles = tagged(
            &[
                (0, PassRole::SaveMarker(tag.clone())),
                (2, PassRole::Blend(tag.clone())),
            ],
            4,
        );
        // Same parity would select slot -1; the blend is skipped instead.
        assert_eq!(resolve_blend_source(&roles, 2, &tag), None);
    }

    #[test]
    fn blend_source_ignores_markers_after_the_consumer() {
        let tag = StateTag::new("X");
        let roles = tagged(
            &[
                (1, PassRole::Blend(tag.clone())),
                (2, PassRole::SaveMarker(tag.clone())),
            ],
            4,
        );
        assert_eq!(resolve_blend_source(&roles, 1, &tag), None);
    }

    #[test]
    fn blend_source_requires_matching_tag() {
        let roles = tagged(
            &[
                (1, PassRole::SaveMarker(StateTag::new("X"))),
                (3, PassRole::Blend(StateTag::new("Y"))),
            ],
            5,
        );
        assert_eq!(resolve_blend_source(&roles, 3, &StateTag::new("Y")), None);
    }

    #[test]
    fn matched_blend_uses_canonical_coords_even_on_the_final_pass() {
        let tag = StateTag::new("X");
        // 4 passes (even): a plain final pass would flip, a matched blend
        // must not.
        let roles = tagged(
            &[
                (1, PassRole::SaveMarker(tag.clone())),
                (3, PassRole::Blend(tag.clone())),
            ],
            4,
        );
        let steps = plan_passes(&roles);
        assert_eq!(steps[3].secondary, Some(1));
        assert_eq!(steps[3].coords, CoordSelect::Canonical);
        assert!(!steps[3].unmatched_blend);
    }

    #[test]
    fn unmatched_blend_degrades_to_positional_pass_through() {
        let roles = tagged(&[(1, PassRole::Blend(StateTag::new("lost")))], 2);
        let steps = plan_passes(&roles);
        assert!(steps[1].unmatched_blend);
        assert_eq!(steps[1].secondary, None);
        // Final pass of an even chain: the positional flip still applies.
        assert_eq!(steps[1].coords, CoordSelect::CanonicalFlipped);
    }

    #[test]
    fn empty_chain_plans_nothing() {
        assert!(plan_passes(&[]).is_empty());
    }
}
