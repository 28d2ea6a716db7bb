use crate::camera::PerspectiveCamera;
use crate::material::Material;
use crate::mesh::StaticMesh;
use nalgebra_glm::{Mat4, Vec3, Vec4, vec4};
use slotmap::{SlotMap, new_key_type};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static WORLD_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

new_key_type! {
    pub struct NodeHandle;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(u64);

/// Flat node container. Handles stay valid until the node is removed and are never reused for another node.
pub struct World {
    id: WorldId,
    nodes: SlotMap<NodeHandle, Node>,
    order: Vec<NodeHandle>,
    pub camera: Option<PerspectiveCamera>,
}

impl World {
    pub fn new() -> Self {
        Self {
            id: WorldId(WORLD_ID_COUNTER.fetch_add(1, Ordering::SeqCst)),
            nodes: SlotMap::with_key(),
            order: Vec::new(),
            camera: None,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn add_node(&mut self, node: Node) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.order.push(handle);
        handle
    }

    pub fn add_mesh(&mut self, name: impl Into<String>, transform: Mat4, mesh: MeshNode) -> NodeHandle {
        self.add_node(Node::new(name, transform, NodeKind::Mesh(mesh)))
    }

    pub fn add_light(&mut self, name: impl Into<String>, transform: Mat4, light: LightNode) -> NodeHandle {
        self.add_node(Node::new(name, transform, NodeKind::Light(light)))
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Option<Node> {
        let node = self.nodes.remove(handle)?;
        self.order.retain(|h| *h != handle);
        Some(node)
    }

    pub fn resolve(&self, handle: NodeHandle) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn resolve_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.nodes.get_mut(handle)
    }

    /// Every node, visible or not, in no particular order.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Visible nodes in insertion order.
    pub fn visible_nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.order
            .iter()
            .filter_map(|h| self.nodes.get(*h).map(|n| (*h, n)))
            .filter(|(_, n)| n.visible)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Node {
    pub name: String,
    pub transform: Mat4,
    pub visible: bool,
    pub kind: NodeKind,
}

pub enum NodeKind {
    Mesh(MeshNode),
    Light(LightNode),
}

impl Node {
    pub fn new(name: impl Into<String>, transform: Mat4, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform,
            visible: true,
            kind,
        }
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mesh_mut(&mut self) -> Option<&mut MeshNode> {
        match &mut self.kind {
            NodeKind::Mesh(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&LightNode> {
        match &self.kind {
            NodeKind::Light(l) => Some(l),
            _ => None,
        }
    }

    pub fn world_position(&self) -> Vec3 {
        self.transform.column(3).xyz()
    }

    /// Local -Z axis in world space.
    pub fn world_direction(&self) -> Vec3 {
        let dir = self.transform * vec4(0.0, 0.0, -1.0, 0.0);
        nalgebra_glm::normalize(&dir.xyz())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MeshMobility {
    #[default]
    Static,
    Movable,
}

pub struct MeshNode {
    pub mesh: Option<Rc<StaticMesh>>,
    pub material: Option<Rc<Material>>,
    pub mobility: MeshMobility,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    pub bake_lighting: bool,
    instance_colors: Vec<u32>,
    baked: bool,
}

impl MeshNode {
    pub fn new(mesh: Rc<StaticMesh>) -> Self {
        Self {
            mesh: Some(mesh),
            material: None,
            mobility: MeshMobility::Static,
            cast_shadows: true,
            receive_shadows: true,
            bake_lighting: true,
            instance_colors: Vec::new(),
            baked: false,
        }
    }

    pub fn with_material(mut self, material: Rc<Material>) -> Self {
        self.material = Some(material);
        self
    }

    pub fn instance_colors(&self) -> &[u32] {
        &self.instance_colors
    }

    /// True once the colors hold a finished light bake rather than a preview.
    pub fn has_baked_lighting(&self) -> bool {
        self.baked && !self.instance_colors.is_empty()
    }

    pub fn set_instance_colors(&mut self, colors: Vec<u32>, baked: bool) {
        self.instance_colors = colors;
        self.baked = baked;
    }

    pub fn clear_instance_colors(&mut self) {
        self.instance_colors.clear();
        self.baked = false;
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LightKind {
    Point { radius: f32 },
    Directional,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LightingDomain {
    #[default]
    Static,
    Stationary,
    Dynamic,
}

#[derive(Clone, Debug)]
pub struct LightNode {
    pub kind: LightKind,
    pub color: Vec4,
    pub intensity: f32,
    pub domain: LightingDomain,
    pub cast_shadows: bool,
}

impl LightNode {
    pub fn point(color: Vec4, intensity: f32, radius: f32) -> Self {
        Self {
            kind: LightKind::Point { radius },
            color,
            intensity,
            domain: LightingDomain::Static,
            cast_shadows: true,
        }
    }

    pub fn directional(color: Vec4, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            domain: LightingDomain::Static,
            cast_shadows: true,
        }
    }

    pub fn with_domain(mut self, domain: LightingDomain) -> Self {
        self.domain = domain;
        self
    }

    pub fn radiance(&self) -> Vec4 {
        let rgb = self.color.xyz() * self.intensity;
        vec4(rgb.x, rgb.y, rgb.z, self.color.w)
    }
}
