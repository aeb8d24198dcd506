use std::f32::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use isoblend::mesh::obj::read_obj;
use isoblend::mesh::sdf::SphereSdf;
use isoblend::mesh::types::{Pt3, Vec3};
use isoblend::{
    ExtractionSettings, IsoError, MeshData, ObjectKind, OffsetLevelCache, Scene, SdfSource,
};

/// Outward-wound UV sphere as OBJ text.
fn uv_sphere_obj(center: Pt3, radius: f32, rings: usize, segments: usize) -> String {
    let mut positions = vec![center + Vec3::new(0.0, radius, 0.0)];
    for ring in 1..rings {
        let theta = PI * ring as f32 / rings as f32;
        for seg in 0..segments {
            let phi = 2.0 * PI * seg as f32 / segments as f32;
            positions.push(
                center
                    + Vec3::new(
                        radius * theta.sin() * phi.cos(),
                        radius * theta.cos(),
                        radius * theta.sin() * phi.sin(),
                    ),
            );
        }
    }
    positions.push(center - Vec3::new(0.0, radius, 0.0));
    let south = positions.len() - 1;

    let ring_start = |ring: usize| 1 + (ring - 1) * segments;
    let mut faces = Vec::new();
    for seg in 0..segments {
        let next = (seg + 1) % segments;
        faces.push([0, ring_start(1) + seg, ring_start(1) + next]);
        faces.push([south, ring_start(rings - 1) + next, ring_start(rings - 1) + seg]);
    }
    for ring in 1..rings - 1 {
        for seg in 0..segments {
            let next = (seg + 1) % segments;
            let (a, b) = (ring_start(ring) + seg, ring_start(ring) + next);
            let (c, d) = (ring_start(ring + 1) + seg, ring_start(ring + 1) + next);
            faces.push([a, c, d]);
            faces.push([a, d, b]);
        }
    }

    let mut obj = String::new();
    for p in &positions {
        writeln!(obj, "v {} {} {}", p.x, p.y, p.z).unwrap();
    }
    for mut face in faces {
        // Force outward winding regardless of the ring layout above.
        let [a, b, c] = face.map(|i| positions[i]);
        let normal = (b - a).cross(&(c - a));
        let centroid = Pt3::from((a.coords + b.coords + c.coords) / 3.0);
        if normal.dot(&(centroid - center)) < 0.0 {
            face.swap(1, 2);
        }
        writeln!(obj, "f {} {} {}", face[0] + 1, face[1] + 1, face[2] + 1).unwrap();
    }
    obj
}

fn write_sphere(dir: &Path, name: &str, center: Pt3, radius: f32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, uv_sphere_obj(center, radius, 16, 32)).unwrap();
    path
}

fn world_radii(mesh: &MeshData, settings: &ExtractionSettings, center: Pt3) -> Vec<f32> {
    mesh.vertices
        .chunks_exact(3)
        .map(|v| (settings.normalized_to_world([v[0], v[1], v[2]]) - center).magnitude())
        .collect()
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

#[test]
fn static_sphere_surface_lies_on_radius() {
    let mut scene = Scene::new(0, 1);
    scene
        .set_object(ObjectKind::Static, 0, SphereSdf::new(Pt3::origin(), 5.0))
        .unwrap();

    let settings = ExtractionSettings {
        offset_levels: 1,
        ..Default::default()
    };
    let cache = OffsetLevelCache::build(&scene, &settings).unwrap();
    let mesh = cache.entry(0, ObjectKind::Static, 0).unwrap();

    assert!(mesh.triangle_count() > 1000);
    assert_eq!(mesh.vertices.len() % 9, 0);
    assert_eq!(mesh.normals.len(), mesh.vertices.len());

    let cell_diagonal = settings.cell_size().magnitude();
    for r in world_radii(mesh, &settings, Pt3::origin()) {
        assert!(
            (r - 5.0).abs() < cell_diagonal,
            "vertex at radius {r} is off the surface"
        );
    }
}

#[test]
fn repeated_builds_are_byte_identical() {
    let mut scene = Scene::new(2, 1);
    scene
        .set_object(ObjectKind::Dynamic, 0, SphereSdf::new(Pt3::new(-1.5, 0.0, 0.0), 2.0))
        .unwrap();
    scene
        .set_object(ObjectKind::Dynamic, 1, SphereSdf::new(Pt3::new(1.5, 0.0, 0.0), 2.0))
        .unwrap();
    scene
        .set_object(ObjectKind::Static, 0, SphereSdf::new(Pt3::new(0.0, -4.0, 0.0), 2.0))
        .unwrap();

    let settings = ExtractionSettings {
        resolution: [32, 32, 32],
        bbox_min: [-8.0; 3],
        bbox_max: [8.0; 3],
        offset_levels: 3,
        offset_step: 0.5,
        ..Default::default()
    };

    let first = OffsetLevelCache::build(&scene, &settings).unwrap();
    let second = OffsetLevelCache::build(&scene, &settings).unwrap();

    for ((_, _, _, a), (_, _, _, b)) in first.iter().zip(second.iter()) {
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }
    assert_eq!(first.iter().count(), 9);
}

#[test]
fn obj_shape_inflates_by_offset_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let center = Pt3::new(0.5, 0.0, -0.5);
    let mesh_path = write_sphere(dir.path(), "ball.obj", center, 2.0);

    let settings = ExtractionSettings {
        resolution: [24, 24, 24],
        bbox_min: [-4.0; 3],
        bbox_max: [4.0; 3],
        offset_levels: 2,
        offset_step: 0.75,
        dynamic_meshes: vec![mesh_path],
        ..Default::default()
    };
    let scene = settings.build_scene();
    assert!(scene.is_loaded(ObjectKind::Dynamic, 0));

    let cache = OffsetLevelCache::build(&scene, &settings).unwrap();
    let base = world_radii(cache.entry(0, ObjectKind::Dynamic, 0).unwrap(), &settings, center);
    let grown = world_radii(cache.entry(1, ObjectKind::Dynamic, 0).unwrap(), &settings, center);

    // Single dynamic shape, no static: plain inflate by the offset.
    assert!((mean(&base) - 2.0).abs() < 0.15, "base radius {}", mean(&base));
    assert!((mean(&grown) - 2.75).abs() < 0.15, "grown radius {}", mean(&grown));

    let out = dir.path().join("out");
    let written = cache.export_obj(&out, "ball").unwrap();
    assert_eq!(
        written,
        vec![out.join("ball_dyn0_0.obj"), out.join("ball_dyn0_1.obj")]
    );

    let reread = read_obj(&written[1]).unwrap();
    let entry = cache.entry(1, ObjectKind::Dynamic, 0).unwrap();
    assert_eq!(reread.faces.len(), entry.triangle_count());
    assert_eq!(reread.positions.len(), entry.vertex_count());
}

#[test]
fn binary_export_carries_length_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = Scene::new(1, 0);
    scene
        .set_object(ObjectKind::Dynamic, 0, SphereSdf::new(Pt3::origin(), 1.0))
        .unwrap();
    let settings = ExtractionSettings {
        resolution: [12, 12, 12],
        bbox_min: [-2.0; 3],
        bbox_max: [2.0; 3],
        offset_levels: 1,
        ..Default::default()
    };

    let cache = OffsetLevelCache::build(&scene, &settings).unwrap();
    let written = cache.export_binary(dir.path(), "unit").unwrap();
    let bytes = fs::read(&written[0]).unwrap();

    let mesh = cache.entry(0, ObjectKind::Dynamic, 0).unwrap();
    let vertex_bytes = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let normal_bytes = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    assert_eq!(vertex_bytes, mesh.vertices.len() * 4);
    assert_eq!(normal_bytes, vertex_bytes);
    assert_eq!(bytes.len(), 8 + vertex_bytes + normal_bytes);
}

#[test]
fn blended_shapes_stay_out_of_the_static_shape() {
    let mut scene = Scene::new(1, 1);
    scene
        .set_object(ObjectKind::Dynamic, 0, SphereSdf::new(Pt3::new(-2.0, 0.0, 0.0), 1.5))
        .unwrap();
    scene
        .set_object(ObjectKind::Static, 0, SphereSdf::new(Pt3::new(1.5, 0.0, 0.0), 1.5))
        .unwrap();

    let settings = ExtractionSettings {
        resolution: [40, 40, 40],
        bbox_min: [-5.0; 3],
        bbox_max: [5.0; 3],
        offset_levels: 2,
        offset_step: 1.0,
        ..Default::default()
    };
    let cache = OffsetLevelCache::build(&scene, &settings).unwrap();
    let inflated = cache.entry(1, ObjectKind::Dynamic, 0).unwrap();
    assert!(!inflated.is_empty());

    // The obstacle occupies x >= 0; the attenuated offset keeps vertices out.
    let obstacle = SphereSdf::new(Pt3::new(1.5, 0.0, 0.0), 1.5);
    let tolerance = settings.cell_size().magnitude();
    for v in inflated.vertices.chunks_exact(3) {
        let p = settings.normalized_to_world([v[0], v[1], v[2]]);
        assert!(
            obstacle.distance(&p) > -tolerance,
            "vertex {p:?} inside the static shape"
        );
    }
}

#[test]
fn missing_mesh_is_reported_before_extraction() {
    let settings = ExtractionSettings {
        resolution: [8, 8, 8],
        dynamic_meshes: vec![PathBuf::from("/nonexistent/shape.obj")],
        ..Default::default()
    };
    let scene = settings.build_scene();
    let err = OffsetLevelCache::build(&scene, &settings).unwrap_err();
    assert!(matches!(
        err,
        IsoError::ObjectNotLoaded {
            kind: ObjectKind::Dynamic,
            slot: 0
        }
    ));
}

#[test]
fn settings_round_trip_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let settings = ExtractionSettings {
        resolution: [64, 48, 32],
        offset_levels: 6,
        offset_step: 0.2,
        falloff_width: 0.25,
        parallel: false,
        static_meshes: vec![PathBuf::from("table.obj")],
        ..Default::default()
    };
    settings.save(&path).unwrap();

    let loaded = ExtractionSettings::load(&path).unwrap();
    assert_eq!(loaded, settings);

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        ExtractionSettings::load(&path),
        Err(IsoError::Json(_))
    ));
}
