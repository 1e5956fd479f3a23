//! The scene tree: an arena of volumes rooted at the world.

use std::collections::HashMap;
use std::fmt::Write as _;

use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, info, instrument};
use volscene_math::Transform;

use crate::config::SceneSettings;
use crate::error::{Result, SceneError};
use crate::repeat;
use crate::volume::{ShapeKind, VolumeId, VolumeNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Volumes keyed by name, linked to their mothers.
///
/// Nodes are registered with [`SceneTree::add`] and linked by
/// [`SceneTree::build_tree`]. Any structural edit marks the tree dirty;
/// queries rebuild a dirty tree before answering.
#[derive(Debug)]
pub struct SceneTree {
    pub(crate) settings: SceneSettings,
    pub(crate) nodes: SlotMap<VolumeId, VolumeNode>,
    by_name: HashMap<String, VolumeId>,
    order: Vec<VolumeId>,
    pub(crate) world: VolumeId,
    dirty: bool,
    pub(crate) construction_order: Vec<VolumeId>,
    pub(crate) dynamics_validated: bool,
    pub(crate) current_run: Option<usize>,
}

impl SceneTree {
    /// Empty scene holding only the world volume.
    pub fn new(settings: SceneSettings) -> Result<Self> {
        settings.validate()?;
        let mut nodes = SlotMap::with_key();
        let world = nodes.insert(VolumeNode::world(&settings.world));
        let mut by_name = HashMap::new();
        by_name.insert(settings.world.name.clone(), world);
        Ok(Self {
            settings,
            nodes,
            by_name,
            order: vec![world],
            world,
            dirty: true,
            construction_order: Vec::new(),
            dynamics_validated: false,
            current_run: None,
        })
    }

    /// Active settings.
    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Name of the root volume.
    pub fn world_name(&self) -> &str {
        &self.settings.world.name
    }

    /// Arena key of the root volume.
    pub fn world_id(&self) -> VolumeId {
        self.world
    }

    /// Number of volumes, world included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True only if the arena lost its world, which never happens.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if an edit happened since the last [`SceneTree::build_tree`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Volume names in registration order, world first.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(|&id| self.nodes[id].name())
    }

    /// Register a volume. It is linked to its mother by the next tree build.
    ///
    /// Names of the form `<volume>_rep_<index>` are reserved for repetition
    /// placements and rejected.
    pub fn add(&mut self, node: VolumeNode) -> Result<VolumeId> {
        if self.by_name.contains_key(node.name()) {
            return Err(SceneError::DuplicateName(node.name().to_string()));
        }
        if let Ok((base, index)) = repeat::parse_repetition_name(node.name()) {
            return Err(SceneError::ReservedName {
                name: node.name().to_string(),
                base: base.to_string(),
                index,
            });
        }
        let name = node.name().to_string();
        let id = self.nodes.insert(node);
        self.by_name.insert(name, id);
        self.order.push(id);
        self.touch();
        Ok(id)
    }

    /// Unregister a volume that has no daughters and is no boolean operand.
    pub fn remove(&mut self, name: &str) -> Result<VolumeNode> {
        let id = self.id(name)?;
        if id == self.world {
            return Err(SceneError::WorldIsFixed(name.to_string()));
        }
        let children: Vec<String> = self
            .order
            .iter()
            .filter(|&&other| self.requested_mother(other) == Some(id))
            .map(|&other| self.nodes[other].name().to_string())
            .collect();
        if !children.is_empty() {
            return Err(SceneError::HasChildren {
                volume: name.to_string(),
                children,
            });
        }
        for &other in &self.order {
            let node = &self.nodes[other];
            if let Some(operands) = node.shape().operands() {
                if operands.contains(&name) {
                    return Err(SceneError::OperandInUse {
                        volume: name.to_string(),
                        used_by: node.name().to_string(),
                    });
                }
            }
        }
        self.by_name.remove(name);
        self.order.retain(|&other| other != id);
        self.touch();
        self.nodes
            .remove(id)
            .ok_or_else(|| SceneError::UnknownVolume(name.to_string()))
    }

    /// Move a volume under another mother. Takes effect at the next build.
    pub fn set_mother(&mut self, name: &str, mother: &str) -> Result<()> {
        let id = self.id(name)?;
        if id == self.world {
            return Err(SceneError::WorldIsFixed(name.to_string()));
        }
        self.nodes[id].set_mother(Some(mother.to_string()));
        self.touch();
        Ok(())
    }

    /// Arena key of `name`.
    pub fn id(&self, name: &str) -> Result<VolumeId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SceneError::UnknownVolume(name.to_string()))
    }

    /// Volume by name.
    pub fn get(&self, name: &str) -> Option<&VolumeNode> {
        self.by_name.get(name).map(|&id| &self.nodes[id])
    }

    /// Volume by name, or an error naming it.
    pub fn node(&self, name: &str) -> Result<&VolumeNode> {
        Ok(&self.nodes[self.id(name)?])
    }

    /// Volume by arena key.
    pub fn node_by_id(&self, id: VolumeId) -> Option<&VolumeNode> {
        self.nodes.get(id)
    }

    /// Mutable access to a volume.
    ///
    /// Marks the tree dirty and drops dynamics validation, since the caller
    /// may change transforms or schedules.
    pub fn node_mut(&mut self, name: &str) -> Result<&mut VolumeNode> {
        let id = self.id(name)?;
        self.touch();
        Ok(&mut self.nodes[id])
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.dynamics_validated = false;
    }

    /// Mother a node asks for, if it resolves. `None` means the world.
    fn requested_mother(&self, id: VolumeId) -> Option<VolumeId> {
        if id == self.world {
            return None;
        }
        match self.nodes[id].mother() {
            None => Some(self.world),
            Some(mother) => self.by_name.get(mother).copied(),
        }
    }

    /// Link every volume to its mother and check the whole scene.
    ///
    /// Fails on unknown mothers, mother cycles (reported with the cycle
    /// path), empty or improper transforms, unknown or cyclic boolean
    /// operands and bad voxel intervals. On failure nothing is relinked.
    #[instrument(skip(self))]
    pub fn build_tree(&mut self) -> Result<()> {
        let parents = self.link_mothers()?;
        self.check_nodes()?;
        let deps = self.dependencies(&parents)?;
        let order = self.dependency_order(&deps)?;

        for (id, node) in self.nodes.iter_mut() {
            node.parent = parents.get(id).copied();
        }
        self.construction_order = order;
        self.dirty = false;
        info!(volumes = self.nodes.len(), world = %self.world_name(), "scene tree built");
        Ok(())
    }

    /// Rebuild the tree if an edit happened since the last build.
    pub fn ensure_built(&mut self) -> Result<()> {
        if self.dirty {
            self.build_tree()?;
        }
        Ok(())
    }

    fn link_mothers(&self) -> Result<SecondaryMap<VolumeId, VolumeId>> {
        let mut marks: SecondaryMap<VolumeId, Mark> = SecondaryMap::new();
        let mut parents = SecondaryMap::new();
        marks.insert(self.world, Mark::Done);

        for &start in &self.order {
            if marks.contains_key(start) {
                continue;
            }
            let mut chain = Vec::new();
            let mut current = start;
            loop {
                match marks.get(current) {
                    Some(Mark::Done) => break,
                    Some(Mark::InProgress) => {
                        let from = chain.iter().position(|&id| id == current).unwrap_or(0);
                        let mut path: Vec<String> = chain[from..]
                            .iter()
                            .map(|&id| self.nodes[id].name().to_string())
                            .collect();
                        path.push(self.nodes[current].name().to_string());
                        return Err(SceneError::MotherCycle { path });
                    }
                    None => {
                        marks.insert(current, Mark::InProgress);
                        chain.push(current);
                        let node = &self.nodes[current];
                        let mother = self.requested_mother(current).ok_or_else(|| {
                            SceneError::UnknownMother {
                                volume: node.name().to_string(),
                                mother: node.mother().unwrap_or_default().to_string(),
                            }
                        })?;
                        parents.insert(current, mother);
                        current = mother;
                    }
                }
            }
            for id in chain {
                marks.insert(id, Mark::Done);
            }
        }
        Ok(parents)
    }

    fn check_nodes(&self) -> Result<()> {
        let eps = self.settings.rotation_tolerance;
        for &id in &self.order {
            let node = &self.nodes[id];
            if node.transforms().is_empty() {
                return Err(SceneError::EmptyTransforms(node.name().to_string()));
            }
            for (index, t) in node.transforms().iter().enumerate() {
                t.validate(eps).map_err(|source| SceneError::InvalidRotation {
                    volume: node.name().to_string(),
                    index,
                    source,
                })?;
            }
            match node.shape() {
                ShapeKind::Boolean(csg) => {
                    for operand in csg.operands() {
                        if !self.by_name.contains_key(operand) {
                            return Err(SceneError::UnknownOperand {
                                volume: node.name().to_string(),
                                operand: operand.to_string(),
                            });
                        }
                    }
                    csg.transform
                        .validate(eps)
                        .map_err(|source| SceneError::InvalidRotation {
                            volume: node.name().to_string(),
                            index: 0,
                            source,
                        })?;
                }
                ShapeKind::Voxelized(voxels) => voxels.check_intervals()?,
                ShapeKind::Primitive(shape) => {
                    shape.validate().map_err(|source| SceneError::Solid {
                        volume: node.name().to_string(),
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn dependencies(
        &self,
        parents: &SecondaryMap<VolumeId, VolumeId>,
    ) -> Result<SecondaryMap<VolumeId, Vec<VolumeId>>> {
        let mut deps = SecondaryMap::new();
        for &id in &self.order {
            let mut list: Vec<VolumeId> = parents.get(id).copied().into_iter().collect();
            if let Some(operands) = self.nodes[id].shape().operands() {
                for operand in operands {
                    list.push(self.id(operand)?);
                }
            }
            deps.insert(id, list);
        }
        Ok(deps)
    }

    /// Post-order over mothers and operands. Mother cycles are already
    /// excluded, so any cycle found here runs through a boolean operand.
    fn dependency_order(&self, deps: &SecondaryMap<VolumeId, Vec<VolumeId>>) -> Result<Vec<VolumeId>> {
        let mut marks: SecondaryMap<VolumeId, Mark> = SecondaryMap::new();
        let mut order = Vec::with_capacity(self.order.len());

        for &root in &self.order {
            if marks.contains_key(root) {
                continue;
            }
            marks.insert(root, Mark::InProgress);
            let mut stack: Vec<(VolumeId, usize)> = vec![(root, 0)];
            while let Some(&(id, next)) = stack.last() {
                let dep = deps.get(id).and_then(|list| list.get(next)).copied();
                let Some(dep) = dep else {
                    marks.insert(id, Mark::Done);
                    order.push(id);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks.get(dep) {
                    None => {
                        marks.insert(dep, Mark::InProgress);
                        stack.push((dep, 0));
                    }
                    Some(Mark::InProgress) => {
                        let from = stack.iter().position(|&(s, _)| s == dep).unwrap_or(0);
                        let mut path: Vec<String> = stack[from..]
                            .iter()
                            .map(|&(s, _)| self.nodes[s].name().to_string())
                            .collect();
                        path.push(self.nodes[dep].name().to_string());
                        return Err(SceneError::CsgCycle { path });
                    }
                    Some(Mark::Done) => {}
                }
            }
        }
        Ok(order)
    }

    /// Volume names such that mothers and boolean operands come before the
    /// volumes that depend on them.
    pub fn construction_order(&mut self) -> Result<Vec<String>> {
        self.ensure_built()?;
        Ok(self
            .construction_order
            .iter()
            .map(|&id| self.nodes[id].name().to_string())
            .collect())
    }

    /// Mother chain of `name`, nearest first, ending with the world.
    pub fn ancestors(&mut self, name: &str) -> Result<Vec<String>> {
        self.ensure_built()?;
        let id = self.id(name)?;
        Ok(self
            .ancestor_ids(id)
            .map(|a| self.nodes[a].name().to_string())
            .collect())
    }

    pub(crate) fn ancestor_ids(&self, id: VolumeId) -> impl Iterator<Item = VolumeId> + '_ {
        std::iter::successors(self.nodes.get(id).and_then(|n| n.parent), move |&a| {
            self.nodes.get(a).and_then(|n| n.parent)
        })
    }

    /// Number of mother links between `name` and the world (0 for the world).
    pub fn depth(&mut self, name: &str) -> Result<usize> {
        self.ensure_built()?;
        let id = self.id(name)?;
        Ok(self.ancestor_ids(id).count())
    }

    /// Daughters of `name`, in registration order.
    pub fn children(&mut self, name: &str) -> Result<Vec<String>> {
        self.ensure_built()?;
        let id = self.id(name)?;
        Ok(self.child_ids(id).map(|c| self.nodes[c].name().to_string()).collect())
    }

    fn child_ids(&self, id: VolumeId) -> impl Iterator<Item = VolumeId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(move |&c| self.nodes[c].parent == Some(id))
    }

    /// Check that `name` can serve as an attachment point: every volume on
    /// its mother chain, and itself, gets a physical placement.
    pub fn ensure_reachable(&mut self, name: &str) -> Result<()> {
        self.ensure_built()?;
        let id = self.id(name)?;
        let mut below = id;
        for ancestor in std::iter::once(id).chain(self.ancestor_ids(id)) {
            let node = &self.nodes[ancestor];
            if !node.build_physical_volume() {
                return Err(SceneError::MotherNotPlaced {
                    volume: self.nodes[below].name().to_string(),
                    mother: node.name().to_string(),
                });
            }
            below = ancestor;
        }
        Ok(())
    }

    /// Absolute frame of the first repetition of `name`.
    ///
    /// Walks the mother chain accumulating `t = R_m * t + t_m` and
    /// `R = R_m * R`, using each mother's first repetition.
    pub fn world_to_local(&mut self, name: &str) -> Result<Transform> {
        self.world_transform(name, 0)
    }

    /// Absolute frame of repetition `repetition` of `name`.
    pub fn world_transform(&mut self, name: &str, repetition: usize) -> Result<Transform> {
        self.ensure_built()?;
        let id = self.id(name)?;
        let node = &self.nodes[id];
        node.check_repetition(repetition)?;
        let mut acc = node.transforms()[repetition];
        for ancestor in self.ancestor_ids(id) {
            if let Some(mother) = self.nodes[ancestor].transforms().first() {
                acc = mother.compose(&acc);
            }
        }
        debug!(volume = name, repetition, "resolved world transform");
        Ok(acc)
    }

    /// Indented text dump of the hierarchy.
    pub fn render(&mut self) -> Result<String> {
        self.ensure_built()?;
        let mut out = String::new();
        let mut stack = vec![(self.world, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = &self.nodes[id];
            let _ = write!(
                out,
                "{:indent$}{} [{}] {}",
                "",
                node.name(),
                node.shape().kind_name(),
                node.material(),
                indent = depth * 2
            );
            if node.repetition_count() > 1 {
                let _ = write!(out, " x{}", node.repetition_count());
            }
            if let ShapeKind::Boolean(csg) = node.shape() {
                let _ = write!(out, " = {} {} {}", csg.left, csg.op, csg.right);
            }
            if !node.build_physical_volume() {
                let _ = write!(out, " (not placed)");
            }
            if !node.schedules().is_empty() {
                let _ = write!(out, " (dynamic)");
            }
            out.push('\n');
            let children: Vec<VolumeId> = self.child_ids(id).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
        Ok(out)
    }
}
