//! Object list shown next to a render view, fed by scene mutations in the order they happened.

use crate::scene::{Primitive, PrimitiveId};
use std::fmt;

/// What an inspector row can edit. Resolved once when the entry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Material,
    Shape,
    Primitive,
    Transform,
}

impl ObjectKind {
    pub fn label(self) -> &'static str {
        match self {
            ObjectKind::Material => "Material",
            ObjectKind::Shape => "Shape",
            ObjectKind::Primitive => "Primitive",
            ObjectKind::Transform => "Transform",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InspectorFacet {
    pub kind: ObjectKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InspectorEntry {
    pub id: PrimitiveId,
    pub name: String,
    pub kind: ObjectKind,
    pub facets: Vec<InspectorFacet>,
}

impl InspectorEntry {
    pub fn for_primitive(primitive: &Primitive) -> Self {
        let material = primitive.material();
        let shape = primitive.shape();
        let facets = vec![
            InspectorFacet {
                kind: ObjectKind::Material,
                label: format!("{} ({})", material.name, material.kind.label()),
            },
            InspectorFacet { kind: ObjectKind::Shape, label: format!("{} ({})", shape.name, shape.kind.label()) },
            InspectorFacet { kind: ObjectKind::Transform, label: ObjectKind::Transform.label().to_string() },
        ];
        Self { id: primitive.id(), name: primitive.name.clone(), kind: ObjectKind::Primitive, facets }
    }

    pub fn facet(&self, kind: ObjectKind) -> Option<&InspectorFacet> {
        self.facets.iter().find(|facet| facet.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InspectorEffect {
    Added(InspectorEntry),
    Removed(PrimitiveId),
}

#[derive(Debug, Default)]
pub struct InspectorModel {
    entries: Vec<InspectorEntry>,
}

impl InspectorModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, effect: InspectorEffect) {
        match effect {
            InspectorEffect::Added(entry) => {
                if let Some(existing) = self.entries.iter_mut().find(|existing| existing.id == entry.id) {
                    *existing = entry;
                } else {
                    self.entries.push(entry);
                }
            }
            InspectorEffect::Removed(id) => self.entries.retain(|entry| entry.id != id),
        }
    }

    pub fn entries(&self) -> &[InspectorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Material, Shape, Transform};
    use glam::Vec3;

    fn entry(name: &str) -> InspectorEntry {
        let primitive = Primitive::new(name, Shape::sphere(1.0), Material::diffuse("red", Vec3::X), Transform::default());
        InspectorEntry::for_primitive(&primitive)
    }

    #[test]
    fn entry_resolves_facets() {
        let entry = entry("ball");
        assert_eq!(entry.kind, ObjectKind::Primitive);
        assert_eq!(entry.facet(ObjectKind::Material).map(|f| f.label.as_str()), Some("red (Diffuse)"));
        assert_eq!(entry.facet(ObjectKind::Shape).map(|f| f.label.as_str()), Some("Sphere (Sphere)"));
        assert!(entry.facet(ObjectKind::Transform).is_some());
    }

    #[test]
    fn effects_apply_in_order() {
        let mut model = InspectorModel::new();
        let a = entry("a");
        let b = entry("b");
        model.apply(InspectorEffect::Added(a.clone()));
        model.apply(InspectorEffect::Added(b));
        model.apply(InspectorEffect::Removed(a.id));
        assert_eq!(model.names(), vec!["b"]);
    }
}
