//! JSON chain descriptions.
//!
//! A chain description declares the pass sequence by kind name, with nested
//! groups and tagged save/blend passes. Raw serde structs are validated into
//! typed specs; leaf construction goes through a caller-supplied factory so
//! this module stays backend-free.

use std::path::Path;

use cascade_core::EngineError;
use serde::Deserialize;

use crate::{ChainNode, StateTag};

/// Declared kind of one chain entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    Filter { kind: String },
    Group { passes: Vec<NodeSpec> },
    SaveMarker { tag: String },
    Blend { tag: String },
}

/// A validated chain description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainSpec {
    pub passes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
struct JsonPass {
    kind: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    passes: Option<Vec<JsonPass>>,
}

#[derive(Debug, Deserialize)]
struct JsonRoot {
    passes: Vec<JsonPass>,
}

impl ChainSpec {
    /// Loads and validates a chain description from a JSON file.
    ///
    /// An empty pass list is valid and describes a no-op chain.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let root: JsonRoot = serde_json::from_slice(&bytes).map_err(|source| EngineError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let passes =
            validate_passes(root.passes).map_err(|msg| EngineError::InvalidConfig {
                path: path.to_path_buf(),
                msg,
            })?;
        Ok(Self { passes })
    }

    /// Builds a declared tree, resolving each leaf through `factory`.
    ///
    /// `factory` receives `"save"` for save markers, `"blend"` for blend
    /// passes, and the declared kind for everything else; returning `None`
    /// fails the build.
    pub fn build<F>(
        &self,
        factory: &mut impl FnMut(&str) -> Option<F>,
    ) -> Result<Vec<ChainNode<F>>, EngineError> {
        build_nodes(&self.passes, factory)
    }
}

fn validate_passes(raw: Vec<JsonPass>) -> Result<Vec<NodeSpec>, String> {
    raw.into_iter().map(validate_pass).collect()
}

fn validate_pass(p: JsonPass) -> Result<NodeSpec, String> {
    match p.kind.as_str() {
        "" => Err("pass kind must not be empty".to_string()),
        "group" => {
            let Some(passes) = p.passes else {
                return Err("group pass requires 'passes'".to_string());
            };
            Ok(NodeSpec::Group {
                passes: validate_passes(passes)?,
            })
        }
        "save" => match p.tag {
            Some(tag) => Ok(NodeSpec::SaveMarker { tag }),
            None => Err("save pass requires 'tag'".to_string()),
        },
        "blend" => match p.tag {
            Some(tag) => Ok(NodeSpec::Blend { tag }),
            None => Err("blend pass requires 'tag'".to_string()),
        },
        kind => {
            if p.passes.is_some() {
                return Err(format!("filter pass '{kind}' must not declare 'passes'"));
            }
            Ok(NodeSpec::Filter {
                kind: kind.to_string(),
            })
        }
    }
}

fn build_nodes<F>(
    specs: &[NodeSpec],
    factory: &mut impl FnMut(&str) -> Option<F>,
) -> Result<Vec<ChainNode<F>>, EngineError> {
    let mut nodes = Vec::with_capacity(specs.len());
    for spec in specs {
        nodes.push(match spec {
            NodeSpec::Filter { kind } => ChainNode::Filter(make(factory, kind)?),
            NodeSpec::Group { passes } => ChainNode::Group(build_nodes(passes, factory)?),
            NodeSpec::SaveMarker { tag } => ChainNode::SaveMarker {
                tag: StateTag::new(tag.clone()),
                filter: make(factory, "save")?,
            },
            NodeSpec::Blend { tag } => ChainNode::Blend {
                tag: StateTag::new(tag.clone()),
                filter: make(factory, "blend")?,
            },
        });
    }
    Ok(nodes)
}

fn make<F>(factory: &mut impl FnMut(&str) -> Option<F>, kind: &str) -> Result<F, EngineError> {
    factory(kind).ok_or_else(|| EngineError::other(format!("no filter registered for kind '{kind}'")))
}
