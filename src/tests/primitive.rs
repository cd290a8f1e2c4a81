use std::collections::HashMap;

use approx::assert_relative_eq;
use glam::{DVec2, DVec3, Vec2, Vec3, Vec4};

use super::fixtures::{cube_mesh, translation};
use crate::config::{AxisSystem, CoordinateAxis, ImportConfig, MaterialsConfig};
use crate::primitive::{merge_primitives, Primitive, PrimitiveAssembler};
use crate::scene::{
    BlendChannel, BlendDeformer, BlendShape, Material, Mesh, NodeIndex, NodeProperties, SceneBuilder, SceneDocument,
    VertexAttribute,
};

fn triangle_mesh() -> Mesh {
    let points = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
    Mesh::from_polygons("Tri", points, &[vec![0, 1, 2]])
}

fn single(mesh: Mesh, properties: NodeProperties, config: &ImportConfig) -> (SceneDocument, NodeIndex) {
    let mut builder = SceneBuilder::new();
    let node = builder.add_node(1, "Node", properties);
    builder.add_mesh(node, mesh);
    (builder.build(config), node)
}

fn assemble_static(doc: &SceneDocument, node: NodeIndex, config: &ImportConfig) -> Vec<Primitive> {
    PrimitiveAssembler::new(doc, config).assemble(node, None, 0, &MaterialsConfig::default())
}

/// Every triangle of a convex, origin centered solid faces away from the origin.
fn assert_outward(primitive: &Primitive) {
    for triangle in primitive.indices.chunks_exact(3) {
        let [a, b, c] = [0, 1, 2].map(|i| primitive.positions[triangle[i] as usize]);
        let normal = (b - a).cross(c - a);
        assert!(normal.dot(a + b + c) > 0.0, "inward triangle {:?}", triangle);
    }
}

#[test]
fn static_cube_becomes_one_primitive() {
    let config = ImportConfig::default();
    let (doc, node) = single(cube_mesh(), translation(1.0, 2.0, 3.0), &config);
    let primitives = assemble_static(&doc, node, &config);

    assert_eq!(primitives.len(), 1);
    let cube = &primitives[0];
    assert_eq!(cube.material_slot, 0);
    assert_eq!(cube.material, None);
    assert_eq!(cube.indices.len(), 36);
    assert_eq!(cube.num_triangles(), 12);
    assert_eq!(cube.num_vertices(), 36);
    assert_eq!(cube.indices, (0..36).collect::<Vec<u32>>());
    assert!(cube.normals.is_empty());
    assert!(cube.uvs.is_empty());
    assert!(!cube.is_skinned());

    // Static geometry ignores the node transform.
    for p in &cube.positions {
        assert!(p.abs().max_element() <= 1.0);
    }
    assert_outward(cube);
}

#[test]
fn mirroring_conversion_keeps_triangles_outward() {
    let config = ImportConfig {
        target_axes: AxisSystem {
            right: CoordinateAxis::PositiveX,
            up: CoordinateAxis::PositiveY,
            front: CoordinateAxis::NegativeZ,
        },
        ..ImportConfig::default()
    };
    let (doc, node) = single(cube_mesh(), NodeProperties::default(), &config);
    assert!(doc.converter().is_mirroring());
    let primitives = assemble_static(&doc, node, &config);
    assert_outward(&primitives[0]);

    // Face 0 (z = +1) lands on z = -1.
    assert_eq!(primitives[0].positions[0].z, -1.0);
}

#[test]
fn negative_geometry_scale_keeps_triangles_outward() {
    let properties = NodeProperties {
        geometric_scaling: DVec3::new(-1.0, 1.0, 1.0),
        ..NodeProperties::default()
    };
    let config = ImportConfig::default();
    let (doc, node) = single(cube_mesh(), properties, &config);
    assert_outward(&assemble_static(&doc, node, &config)[0]);
}

#[test]
fn skeletal_meshes_take_the_node_transform() {
    let config = ImportConfig::default();
    let (doc, node) = single(cube_mesh(), translation(1.0, 2.0, 3.0), &config);
    let weights: HashMap<u32, Vec<(usize, f64)>> = (0..8).map(|v| (v, vec![(0, 1.0)])).collect();
    let primitives = PrimitiveAssembler::new(&doc, &config).assemble(node, Some(&weights), 1, &MaterialsConfig::default());

    let cube = &primitives[0];
    assert!(cube.is_skinned());
    let min = cube.positions.iter().fold(Vec3::splat(f32::MAX), |m, p| m.min(*p));
    let max = cube.positions.iter().fold(Vec3::splat(f32::MIN), |m, p| m.max(*p));
    assert_eq!(min, Vec3::new(0.0, 1.0, 2.0));
    assert_eq!(max, Vec3::new(2.0, 3.0, 4.0));
    assert!(cube.joints[0].iter().all(|j| *j == [0; 4]));
    assert!(cube.weights[0].iter().all(|w| *w == [1.0, 0.0, 0.0, 0.0]));
}

#[test]
fn geometry_offset_applies_to_static_meshes() {
    let properties = NodeProperties {
        geometric_translation: DVec3::new(0.0, 0.0, 5.0),
        ..NodeProperties::default()
    };
    let config = ImportConfig::default();
    let (doc, node) = single(triangle_mesh(), properties, &config);
    let primitives = assemble_static(&doc, node, &config);
    assert_eq!(
        primitives[0].positions,
        vec![Vec3::new(0.0, 0.0, 5.0), Vec3::new(1.0, 0.0, 5.0), Vec3::new(0.0, 1.0, 5.0)]
    );
}

#[test]
fn normals_follow_the_geometry_rotation() {
    let mut mesh = triangle_mesh();
    mesh.generate_normals();
    let properties = NodeProperties {
        geometric_rotation: DVec3::new(90.0, 0.0, 0.0),
        ..NodeProperties::default()
    };
    let config = ImportConfig::default();
    let (doc, node) = single(mesh, properties, &config);
    let primitives = assemble_static(&doc, node, &config);
    for n in &primitives[0].normals {
        assert!(n.abs_diff_eq(Vec3::NEG_Y, 1e-6), "{:?}", n);
    }
}

#[test]
fn unit_conversion_scales_positions() {
    let mut builder = SceneBuilder::new();
    builder.set_unit_meters(0.01);
    let node = builder.add_node(1, "Tri", NodeProperties::default());
    builder.add_mesh(node, triangle_mesh());
    let config = ImportConfig::default();
    let doc = builder.build(&config);
    let primitives = assemble_static(&doc, node, &config);
    assert!(primitives[0].positions[1].abs_diff_eq(Vec3::new(0.01, 0.0, 0.0), 1e-9));
}

fn cube_with_materials(face_materials: Vec<u32>, material_count: usize) -> (SceneDocument, NodeIndex) {
    let mut builder = SceneBuilder::new();
    let mut mesh = cube_mesh();
    mesh.face_materials = face_materials;
    mesh.materials = ["A", "B", "C"][..material_count]
        .iter()
        .map(|name| builder.add_material(Material::new(name)))
        .collect();
    let node = builder.add_node(1, "Cube", NodeProperties::default());
    builder.add_mesh(node, mesh);
    (builder.build(&ImportConfig::default()), node)
}

#[test]
fn partitions_faces_by_material() {
    let (doc, node) = cube_with_materials(vec![0, 2, 2, 7, 0, 0], 3);
    let primitives = assemble_static(&doc, node, &ImportConfig::default());

    // Slot 1 has no faces; the out of range slot 7 falls back to slot 0.
    assert_eq!(primitives.len(), 2);
    assert_eq!(primitives[0].material_slot, 0);
    assert_eq!(primitives[0].material.as_ref().unwrap().name, "A");
    assert_eq!(primitives[0].indices.len(), 4 * 2 * 3);
    assert_eq!(primitives[1].material_slot, 2);
    assert_eq!(primitives[1].material.as_ref().unwrap().name, "C");
    assert_eq!(primitives[1].indices.len(), 2 * 2 * 3);
    assert_eq!(primitives[0].material.as_ref().unwrap().base_color, Vec4::ONE);

    let config = ImportConfig::default();
    assert_eq!(PrimitiveAssembler::new(&doc, &config).slot_count(node), 3);
}

#[test]
fn concave_faces_triangulate_inside_the_outline() {
    let points = [(1.0, 1.0), (1.0, 2.0), (0.0, 2.0), (0.0, 0.0), (2.0, 0.0), (2.0, 1.0)]
        .iter()
        .map(|&(x, y)| DVec3::new(x, y, 0.0))
        .collect();
    let mesh = Mesh::from_polygons("L", points, &[(0..6).collect()]);
    assert_eq!(mesh.max_face_triangles, 4);
    let config = ImportConfig::default();
    let (doc, node) = single(mesh, NodeProperties::default(), &config);
    let primitive = &assemble_static(&doc, node, &config)[0];

    assert_eq!(primitive.num_triangles(), 4);
    let mut area = 0.0;
    for triangle in primitive.indices.chunks_exact(3) {
        let [a, b, c] = [0, 1, 2].map(|i| primitive.positions[triangle[i] as usize]);
        let z = (b - a).cross(c - a).z;
        assert!(z > 0.0);
        area += z / 2.0;
    }
    assert_relative_eq!(area, 3.0, epsilon = 1e-6);
}

#[test]
fn spreads_influences_over_groups() {
    let config = ImportConfig::default();
    let (doc, node) = single(triangle_mesh(), NodeProperties::default(), &config);
    let mut weights = HashMap::new();
    weights.insert(0u32, (0..5).map(|bone| (bone, 0.2)).collect::<Vec<_>>());
    let primitives = PrimitiveAssembler::new(&doc, &config).assemble(node, Some(&weights), 2, &MaterialsConfig::default());

    let p = &primitives[0];
    assert_eq!(p.joints.len(), 2);
    assert_eq!(p.weights.len(), 2);
    assert_eq!(p.joints[0][0], [0, 1, 2, 3]);
    assert_eq!(p.joints[1][0], [4, 0, 0, 0]);
    assert_eq!(p.weights[0][0], [0.2; 4]);
    assert_eq!(p.weights[1][0], [0.2, 0.0, 0.0, 0.0]);
    // Control point 1 has no weights.
    assert_eq!(p.joints[0][1], [0; 4]);
    assert_eq!(p.weights[0][1], [0.0; 4]);
    assert!(p.joints.iter().all(|group| group.len() == p.num_vertices()));
}

#[test]
fn joint_indices_past_u16_are_skipped() {
    let config = ImportConfig::default();
    let (doc, node) = single(triangle_mesh(), NodeProperties::default(), &config);
    let mut weights = HashMap::new();
    weights.insert(0u32, vec![(70_000usize, 0.5), (3, 0.5)]);
    let primitives = PrimitiveAssembler::new(&doc, &config).assemble(node, Some(&weights), 1, &MaterialsConfig::default());

    let p = &primitives[0];
    assert_eq!(p.joints[0][0], [0, 3, 0, 0]);
    assert_eq!(p.weights[0][0], [0.0, 0.5, 0.0, 0.0]);
}

#[test]
fn flips_texture_coordinates_when_configured() {
    let mut mesh = triangle_mesh();
    mesh.uvs = Some(VertexAttribute::per_corner(vec![
        DVec2::new(0.0, 0.0),
        DVec2::new(1.0, 0.25),
        DVec2::new(0.0, 1.0),
    ]));

    let flipped = ImportConfig::default();
    let (doc, node) = single(mesh.clone(), NodeProperties::default(), &flipped);
    assert_eq!(
        assemble_static(&doc, node, &flipped)[0].uvs,
        vec![Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.75), Vec2::new(0.0, 0.0)]
    );

    let kept = ImportConfig {
        flip_uv_v: false,
        ..ImportConfig::default()
    };
    let (doc, node) = single(mesh, NodeProperties::default(), &kept);
    assert_eq!(assemble_static(&doc, node, &kept)[0].uvs[1], Vec2::new(1.0, 0.25));
}

#[test]
fn emits_morph_target_deltas() {
    let mut builder = SceneBuilder::new();
    let properties = NodeProperties {
        geometric_scaling: DVec3::splat(2.0),
        ..NodeProperties::default()
    };
    let node = builder.add_node(1, "Face", properties);
    let mesh = builder.add_mesh(node, triangle_mesh());
    builder.add_blend(
        mesh,
        BlendDeformer {
            name: "Shapes".to_string(),
            channels: vec![BlendChannel {
                name: "Smile".to_string(),
                weight: 0.0,
                shapes: vec![BlendShape {
                    name: "Smile".to_string(),
                    offsets: vec![(1, DVec3::Z)],
                }],
            }],
        },
    );
    let config = ImportConfig::default();
    let doc = builder.build(&config);
    let primitives = assemble_static(&doc, node, &config);

    let targets = &primitives[0].morph_targets;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "Smile");
    assert_eq!(targets[0].positions, vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), Vec3::ZERO]);
}

#[test]
fn empty_meshes_give_no_primitives() {
    let config = ImportConfig::default();
    let (doc, node) = single(Mesh::from_polygons("Empty", Vec::new(), &[]), NodeProperties::default(), &config);
    assert!(assemble_static(&doc, node, &config).is_empty());
    assert!(assemble_static(&doc, doc.root(), &config).is_empty());
}

#[test]
fn merging_offsets_material_slots() {
    let slot = |s| Primitive {
        material_slot: s,
        ..Primitive::default()
    };
    let mut merged = vec![slot(0), slot(1)];
    merge_primitives(&mut merged, vec![slot(0), slot(1)], 3);
    let slots: Vec<usize> = merged.iter().map(|p| p.material_slot).collect();
    assert_eq!(slots, [0, 1, 3, 4]);
}
