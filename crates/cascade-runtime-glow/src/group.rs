//! Filter-group composition: the off-screen target arena and the pass
//! executor that drives a flattened chain for one frame.

use std::fmt;

use glow::HasContext;

use cascade_chain::coords::{CANONICAL_QUAD, CANONICAL_TEX, CANONICAL_TEX_FLIPPED};
use cascade_chain::plan::{plan_passes, CoordSelect, InputSelect, OutputBinding};
use cascade_chain::{flatten, node_at, node_at_mut, ChainNode, MergedPass, PassRole};

use crate::{create_render_target, EngineError, Filter, RenderTarget};

/// Owned, index-addressed array of off-screen targets, one per non-final
/// pass.
///
/// Targets are allocated wholesale for a (size, pass count) pair and released
/// wholesale; slots are never resized in place, so handle sets from
/// consecutive allocations are disjoint.
#[derive(Debug, Default)]
pub struct TargetArena {
    targets: Vec<RenderTarget>,
}

impl TargetArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&RenderTarget> {
        self.targets.get(slot)
    }

    /// Replaces any previous allocation with `pass_count - 1` fresh targets.
    ///
    /// `pass_count <= 1` allocates nothing: a single pass draws straight to
    /// the final destination. A creation failure releases the partial set
    /// before surfacing; a dangling slot would corrupt the visible frame.
    pub unsafe fn allocate(
        &mut self,
        gl: &glow::Context,
        width: i32,
        height: i32,
        pass_count: usize,
    ) -> Result<(), EngineError> {
        self.release(gl);
        if pass_count <= 1 {
            return Ok(());
        }
        for _ in 0..pass_count - 1 {
            match create_render_target(gl, width, height) {
                Ok(rt) => self.targets.push(rt),
                Err(e) => {
                    self.release(gl);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Deletes every framebuffer and texture owned by the arena.
    pub unsafe fn release(&mut self, gl: &glow::Context) {
        for rt in self.targets.drain(..) {
            gl.delete_framebuffer(rt.fbo);
            gl.delete_texture(rt.tex);
        }
    }
}

type BoxedFilter = Box<dyn Filter>;

/// An ordered, possibly nested chain of filters executed as one multi-pass
/// draw sequence.
///
/// The group owns its declared tree (ownership is tree-shaped; destroying the
/// group destroys every leaf exactly once), the derived merged sequence, and
/// the off-screen target arena. All operations happen on the thread owning
/// the GL context; concurrent resize and draw must be serialized by the
/// caller.
#[derive(Default)]
pub struct FilterGroup {
    nodes: Vec<ChainNode<BoxedFilter>>,
    merged: Vec<MergedPass>,
    size: Option<(i32, i32)>,
    targets: TargetArena,
}

impl fmt::Debug for FilterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Leaf filters own GL handles and do not implement Debug.
        f.debug_struct("FilterGroup")
            .field("declared", &self.nodes.len())
            .field("merged", &self.merged.len())
            .field("size", &self.size)
            .field("targets", &self.targets.len())
            .finish()
    }
}

impl FilterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a group from an already declared tree and flattens it.
    pub fn with_nodes(nodes: Vec<ChainNode<BoxedFilter>>) -> Self {
        let mut group = Self {
            nodes,
            ..Self::default()
        };
        group.update_merged_filters();
        group
    }

    /// Appends a node to the declared sequence and recomputes the merged
    /// sequence. Call `resize` before the next draw so the arena matches.
    pub fn add_filter(&mut self, node: ChainNode<BoxedFilter>) {
        self.nodes.push(node);
        self.update_merged_filters();
    }

    /// Empties the declared sequence. The merged sequence is intentionally
    /// left stale; recompute and resize before the next draw.
    pub fn clear_filters(&mut self) {
        self.nodes.clear();
    }

    pub fn filters(&self) -> &[ChainNode<BoxedFilter>] {
        &self.nodes
    }

    pub fn merged(&self) -> &[MergedPass] {
        &self.merged
    }

    /// Rebuilds the merged sequence from the declared tree.
    pub fn update_merged_filters(&mut self) {
        self.merged = flatten(&self.nodes);
    }

    pub fn size(&self) -> Option<(i32, i32)> {
        self.size
    }

    /// Initializes every leaf that has not been initialized yet.
    pub unsafe fn init(&mut self, gl: &glow::Context) -> Result<(), EngineError> {
        init_nodes(gl, &mut self.nodes)
    }

    /// Propagates the new output size to every leaf, then reallocates the
    /// off-screen arena to match the merged pass count.
    ///
    /// A zero-size request is a configuration error and leaves everything
    /// untouched.
    pub unsafe fn resize(
        &mut self,
        gl: &glow::Context,
        width: i32,
        height: i32,
    ) -> Result<(), EngineError> {
        if width <= 0 || height <= 0 {
            eprintln!("[FilterGroup] ignoring zero-size resize request ({width}x{height})");
            return Ok(());
        }
        resize_nodes(gl, &mut self.nodes, width, height);
        self.size = Some((width, height));
        self.targets.allocate(gl, width, height, self.merged.len())
    }

    /// Executes the merged chain once: each pass reads the previous pass's
    /// texture and writes off-screen, except the final pass which writes
    /// `destination` (`None` = default framebuffer).
    ///
    /// Precondition violations (no resize yet, arena out of step with the
    /// merged sequence, stale merged paths) drop the frame without touching
    /// the destination.
    pub unsafe fn draw(
        &mut self,
        gl: &glow::Context,
        source: glow::NativeTexture,
        destination: Option<glow::NativeFramebuffer>,
        quad: &[f32; 8],
        tex_coords: &[f32; 8],
    ) -> Result<(), EngineError> {
        let n = self.merged.len();
        if n == 0 {
            return Ok(());
        }
        let Some((width, height)) = self.size else {
            return Ok(());
        };
        if self.targets.len() + 1 != n {
            return Ok(());
        }
        if self
            .merged
            .iter()
            .any(|m| node_at(&self.nodes, &m.path).and_then(ChainNode::filter).is_none())
        {
            eprintln!(
                "[FilterGroup] merged sequence out of date; call update_merged_filters() and resize()"
            );
            return Ok(());
        }

        let roles: Vec<PassRole> = self.merged.iter().map(|m| m.role.clone()).collect();
        let steps = plan_passes(&roles);

        let Self {
            nodes,
            merged,
            targets,
            ..
        } = self;

        for step in &steps {
            let entry = &merged[step.pass];
            let Some(filter) = node_at_mut(nodes, &entry.path).and_then(ChainNode::filter_mut)
            else {
                return Ok(());
            };
            filter.ensure_init(gl)?;

            match step.output {
                OutputBinding::Offscreen(slot) => {
                    let Some(rt) = targets.get(slot) else {
                        return Ok(());
                    };
                    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(rt.fbo));
                    gl.viewport(0, 0, rt.w, rt.h);
                    gl.clear_color(0.0, 0.0, 0.0, 0.0);
                    gl.clear(glow::COLOR_BUFFER_BIT);
                }
                OutputBinding::Destination => {
                    gl.bind_framebuffer(glow::FRAMEBUFFER, destination);
                    gl.viewport(0, 0, width, height);
                }
            }

            let input = match step.input {
                InputSelect::Source => source,
                InputSelect::Offscreen(slot) => match targets.get(slot) {
                    Some(rt) => rt.tex,
                    None => return Ok(()),
                },
            };

            if let PassRole::Blend(tag) = &entry.role {
                if step.unmatched_blend {
                    eprintln!(
                        "[FilterGroup] no saved state for blend tag '{tag}'; drawing pass-through"
                    );
                }
                let secondary = step
                    .secondary
                    .and_then(|slot| targets.get(slot))
                    .map(|rt| rt.tex);
                filter.set_secondary_texture(secondary);
            }

            let (geometry, coords) = match step.coords {
                CoordSelect::Caller => (quad, tex_coords),
                CoordSelect::Canonical => (&CANONICAL_QUAD, &CANONICAL_TEX),
                CoordSelect::CanonicalFlipped => (&CANONICAL_QUAD, &CANONICAL_TEX_FLIPPED),
            };

            filter.draw(gl, input, geometry, coords)?;

            if matches!(step.output, OutputBinding::Offscreen(_)) {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            }
        }

        Ok(())
    }

    /// Releases the arena and destroys every leaf.
    pub unsafe fn destroy(&mut self, gl: &glow::Context) {
        self.targets.release(gl);
        destroy_nodes(gl, &mut self.nodes);
    }
}

unsafe fn init_nodes(
    gl: &glow::Context,
    nodes: &mut [ChainNode<BoxedFilter>],
) -> Result<(), EngineError> {
    for node in nodes {
        match node {
            ChainNode::Filter(f)
            | ChainNode::SaveMarker { filter: f, .. }
            | ChainNode::Blend { filter: f, .. } => f.ensure_init(gl)?,
            ChainNode::Group(children) => init_nodes(gl, children)?,
        }
    }
    Ok(())
}

unsafe fn resize_nodes(
    gl: &glow::Context,
    nodes: &mut [ChainNode<BoxedFilter>],
    width: i32,
    height: i32,
) {
    for node in nodes {
        match node {
            ChainNode::Filter(f)
            | ChainNode::SaveMarker { filter: f, .. }
            | ChainNode::Blend { filter: f, .. } => f.resize(gl, width, height),
            ChainNode::Group(children) => resize_nodes(gl, children, width, height),
        }
    }
}

unsafe fn destroy_nodes(gl: &glow::Context, nodes: &mut [ChainNode<BoxedFilter>]) {
    for node in nodes {
        match node {
            ChainNode::Filter(f)
            | ChainNode::SaveMarker { filter: f, .. }
            | ChainNode::Blend { filter: f, .. } => f.destroy(gl),
            ChainNode::Group(children) => destroy_nodes(gl, children),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_chain::StateTag;

    /// A filter that never touches GL; group bookkeeping tests only.
    struct NullFilter;

    impl Filter for NullFilter {
        unsafe fn init(&mut self, _gl: &glow::Context) -> Result<(), EngineError> {
            Ok(())
        }

        fn is_initialized(&self) -> bool {
            true
        }

        unsafe fn resize(&mut self, _gl: &glow::Context, _width: i32, _height: i32) {}

        unsafe fn draw(
            &mut self,
            _gl: &glow::Context,
            _input: glow::NativeTexture,
            _quad: &[f32; 8],
            _tex_coords: &[f32; 8],
        ) -> Result<(), EngineError> {
            Ok(())
        }

        unsafe fn destroy(&mut self, _gl: &glow::Context) {}
    }

    fn leaf() -> ChainNode<BoxedFilter> {
        ChainNode::Filter(Box::new(NullFilter))
    }

    #[test]
    fn add_filter_recomputes_the_merged_sequence() {
        let mut group = FilterGroup::new();
        assert!(group.merged().is_empty());

        group.add_filter(leaf());
        group.add_filter(ChainNode::Group(vec![leaf(), leaf()]));
        assert_eq!(group.merged().len(), 3);
    }

    #[test]
    fn clear_filters_leaves_the_merged_sequence_stale() {
        let mut group = FilterGroup::new();
        group.add_filter(leaf());
        group.clear_filters();

        assert!(group.filters().is_empty());
        assert_eq!(group.merged().len(), 1);

        group.update_merged_filters();
        assert!(group.merged().is_empty());
    }

    #[test]
    fn with_nodes_flattens_save_and_blend_roles() {
        let group = FilterGroup::with_nodes(vec![
            ChainNode::SaveMarker {
                tag: StateTag::new("orig"),
                filter: Box::new(NullFilter),
            },
            leaf(),
            ChainNode::Blend {
                tag: StateTag::new("orig"),
                filter: Box::new(NullFilter),
            },
        ]);

        let roles: Vec<_> = group.merged().iter().map(|m| m.role.clone()).collect();
        assert_eq!(
            roles,
            vec![
                PassRole::SaveMarker(StateTag::new("orig")),
                PassRole::Plain,
                PassRole::Blend(StateTag::new("orig")),
            ]
        );
    }

    #[test]
    fn empty_subgroups_never_become_passes() {
        let group = FilterGroup::with_nodes(vec![ChainNode::Group(vec![]), leaf()]);
        assert_eq!(group.merged().len(), 1);
    }
}
