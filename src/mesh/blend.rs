//! Offset blending between dynamic shapes and the static obstacle.
//!
//! Each dynamic shape is inflated by the active offset, except where the
//! inflation would push it into a sibling or into the static shape. There
//! the offset is scaled down by a ramp that goes smoothly from 0 at the
//! boundary towards 1 deeper inside the bound.

use crate::error::{IsoError, ObjectKind, Result};
use crate::mesh::scene::Scene;
use crate::mesh::sdf::SdfSource;
use crate::mesh::types::Pt3;

/// Default width of the offset ramp.
pub const DEFAULT_FALLOFF_WIDTH: f32 = 0.1;

/// Which hand-derived formula applies, chosen by object counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendPolicy {
    /// One dynamic shape on its own: plain inflate.
    Single,
    /// One dynamic shape kept outside the static shape.
    SingleOnStatic,
    /// Two dynamic shapes.
    Pair { with_static: bool },
    /// Three dynamic shapes.
    Triple { with_static: bool },
}

impl BlendPolicy {
    pub fn for_counts(dynamic: usize, statics: usize) -> Result<Self> {
        let with_static = statics > 0;
        match dynamic {
            1 if with_static => Ok(BlendPolicy::SingleOnStatic),
            1 => Ok(BlendPolicy::Single),
            2 => Ok(BlendPolicy::Pair { with_static }),
            3 => Ok(BlendPolicy::Triple { with_static }),
            _ => Err(IsoError::UnsupportedObjectCount { dynamic }),
        }
    }

    fn uses_static(self) -> bool {
        match self {
            BlendPolicy::Single => false,
            BlendPolicy::SingleOnStatic => true,
            BlendPolicy::Pair { with_static } | BlendPolicy::Triple { with_static } => with_static,
        }
    }
}

/// Ramp `|b/w| / (|b/w| + 1)` for `b < 0`, zero otherwise.
#[inline]
pub fn falloff_ratio(bound: f32, width: f32) -> f32 {
    if bound < 0.0 {
        let fa = (bound / width).abs();
        fa / (fa + 1.0)
    } else {
        0.0
    }
}

/// Blends the dynamic shapes of a scene.
pub struct FieldBlender<'a> {
    dynamic: Vec<&'a dyn SdfSource>,
    obstacle: Option<&'a dyn SdfSource>,
    policy: BlendPolicy,
    falloff_width: f32,
}

impl<'a> FieldBlender<'a> {
    /// Resolve the policy and borrow every source it needs. Fails when the
    /// dynamic count is outside 1..=3 or a needed slot is empty.
    pub fn new(scene: &'a Scene, falloff_width: f32) -> Result<Self> {
        let policy = BlendPolicy::for_counts(scene.dynamic_count(), scene.static_count())?;

        let dynamic = (0..scene.dynamic_count())
            .map(|slot| scene.source(ObjectKind::Dynamic, slot))
            .collect::<Result<Vec<_>>>()?;

        // Only the first static slot takes part in blending.
        let obstacle = if policy.uses_static() {
            Some(scene.source(ObjectKind::Static, 0)?)
        } else {
            None
        };

        Ok(Self {
            dynamic,
            obstacle,
            policy,
            falloff_width,
        })
    }

    pub fn policy(&self) -> BlendPolicy {
        self.policy
    }

    /// Bind a dynamic object and an offset into a scalar field.
    pub fn field(&self, object: usize, offset: f32) -> Result<BlendedField<'_>> {
        let own = *self
            .dynamic
            .get(object)
            .ok_or(IsoError::SlotOutOfRange {
                kind: ObjectKind::Dynamic,
                slot: object,
                count: self.dynamic.len(),
            })?;

        let others = self
            .dynamic
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != object)
            .map(|(_, s)| *s)
            .collect();

        Ok(BlendedField {
            own,
            others,
            obstacle: self.obstacle,
            policy: self.policy,
            offset,
            falloff_width: self.falloff_width,
        })
    }

    /// One-shot evaluation for `object` at `point`.
    pub fn value(&self, point: &Pt3, object: usize, offset: f32) -> Result<f32> {
        Ok(self.field(object, offset)?.distance(point))
    }
}

/// The blended field of one dynamic object at one offset.
pub struct BlendedField<'a> {
    own: &'a dyn SdfSource,
    /// Sibling dynamic shapes in slot order, excluding `own`.
    others: Vec<&'a dyn SdfSource>,
    obstacle: Option<&'a dyn SdfSource>,
    policy: BlendPolicy,
    offset: f32,
    falloff_width: f32,
}

impl BlendedField<'_> {
    fn obstacle_distance(&self, point: &Pt3) -> Option<f32> {
        self.obstacle.map(|s| s.distance(point))
    }

    /// Offset attenuated by the ramp over `bound`.
    fn attenuated(&self, own: f32, bound: f32) -> f32 {
        own - self.offset * falloff_ratio(bound, self.falloff_width)
    }
}

impl SdfSource for BlendedField<'_> {
    fn distance(&self, point: &Pt3) -> f32 {
        let own = self.own.distance(point);
        let offset = self.offset;

        match self.policy {
            BlendPolicy::Single => own - offset,
            BlendPolicy::SingleOnStatic => {
                let sta = self.obstacle_distance(point).unwrap_or(f32::MAX);
                let bound = own.max(-sta);
                self.attenuated(own, bound)
            }
            BlendPolicy::Pair { .. } => {
                let other = self.others[0].distance(point);
                let dyn_bound = (own - offset) - (other - offset);
                let bound = match self.obstacle_distance(point) {
                    Some(sta) => dyn_bound.min(own).max(-other.min(sta)),
                    None => dyn_bound.min(own).max(-other),
                };
                self.attenuated(own, bound)
            }
            BlendPolicy::Triple { .. } => {
                let a = self.others[0].distance(point);
                let b = self.others[1].distance(point);
                let ub = own - offset;
                let dyn_bound = (ub - (a - offset)).max(ub - (b - offset));
                let other = a.min(b);
                let bound = match self.obstacle_distance(point) {
                    Some(sta) => dyn_bound.min(own).max(-other.min(sta)),
                    None => dyn_bound.min(own).max(-other),
                };
                self.attenuated(own, bound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::sdf::SphereSdf;
    use approx::assert_relative_eq;

    fn sphere(x: f32, r: f32) -> SphereSdf {
        SphereSdf::new(Pt3::new(x, 0.0, 0.0), r)
    }

    fn sample_points() -> Vec<Pt3> {
        let mut points = Vec::new();
        for i in -4..=4 {
            for j in -2..=2 {
                points.push(Pt3::new(i as f32 * 1.7, j as f32 * 0.9, (i * j) as f32 * 0.3));
            }
        }
        points
    }

    #[test]
    fn policy_dispatch() {
        assert_eq!(BlendPolicy::for_counts(1, 0).unwrap(), BlendPolicy::Single);
        assert_eq!(
            BlendPolicy::for_counts(1, 2).unwrap(),
            BlendPolicy::SingleOnStatic
        );
        assert_eq!(
            BlendPolicy::for_counts(2, 0).unwrap(),
            BlendPolicy::Pair { with_static: false }
        );
        assert_eq!(
            BlendPolicy::for_counts(3, 1).unwrap(),
            BlendPolicy::Triple { with_static: true }
        );
        for bad in [0, 4, 7] {
            assert!(matches!(
                BlendPolicy::for_counts(bad, 0),
                Err(IsoError::UnsupportedObjectCount { dynamic }) if dynamic == bad
            ));
        }
    }

    #[test]
    fn falloff_ramp() {
        assert_eq!(falloff_ratio(0.0, 0.1), 0.0);
        assert_eq!(falloff_ratio(2.0, 0.1), 0.0);
        // |-0.1 / 0.1| = 1 -> 1/2
        assert_relative_eq!(falloff_ratio(-0.1, 0.1), 0.5);
        // |-0.9 / 0.1| = 9 -> 9/10
        assert_relative_eq!(falloff_ratio(-0.9, 0.1), 0.9, epsilon = 1e-6);
        assert!(falloff_ratio(-100.0, 0.1) < 1.0);
    }

    #[test]
    fn single_object_is_plain_offset() {
        let mut scene = Scene::new(1, 0);
        let source = sphere(0.0, 3.0);
        scene.set_object(ObjectKind::Dynamic, 0, source).unwrap();
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();

        for offset in [0.0, 0.5, 1.0, 3.0, -2.0] {
            for p in sample_points() {
                let expected = source.distance(&p) - offset;
                assert_eq!(blender.value(&p, 0, offset).unwrap(), expected);
            }
        }
    }

    #[test]
    fn zero_offset_returns_own_distance() {
        let mut scene = Scene::new(3, 1);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(-3.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Dynamic, 1, sphere(0.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Dynamic, 2, sphere(3.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Static, 0, sphere(0.0, 0.5)).unwrap();
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();

        for object in 0..3 {
            let own = scene.source(ObjectKind::Dynamic, object).unwrap();
            for p in sample_points() {
                assert_eq!(blender.value(&p, object, 0.0).unwrap(), own.distance(&p));
            }
        }
    }

    #[test]
    fn static_obstacle_suppresses_inflation() {
        // Dynamic sphere at the origin, static sphere overlapping its +x side.
        let mut scene = Scene::new(1, 1);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(0.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Static, 0, sphere(3.0, 2.0)).unwrap();
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();
        assert_eq!(blender.policy(), BlendPolicy::SingleOnStatic);

        // Deep inside the dynamic shape and away from the obstacle: bound is
        // max(-2, -(3 - 2)) = -1, ratio = 10/11.
        let p = Pt3::origin();
        let v = blender.value(&p, 0, 1.0).unwrap();
        assert_relative_eq!(v, -2.0 - 10.0 / 11.0, epsilon = 1e-5);

        // Inside the obstacle: bound is positive, no inflation at all.
        let q = Pt3::new(2.5, 0.0, 0.0);
        let own = scene.distance(ObjectKind::Dynamic, 0, &q).unwrap();
        assert_relative_eq!(blender.value(&q, 0, 1.0).unwrap(), own);

        // Outside the dynamic shape: also no inflation.
        let r = Pt3::new(-5.0, 0.0, 0.0);
        assert_relative_eq!(blender.value(&r, 0, 1.0).unwrap(), 3.0);
    }

    #[test]
    fn pair_matches_hand_computation() {
        let mut scene = Scene::new(2, 0);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(-1.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Dynamic, 1, sphere(2.0, 2.0)).unwrap();
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();

        let p = Pt3::new(-1.5, 0.0, 0.0);
        let own: f32 = 0.5 - 2.0; // -1.5
        let other: f32 = 3.5 - 2.0; // 1.5
        let offset: f32 = 2.0;
        let dyn_bound = (own - offset) - (other - offset);
        let bound = dyn_bound.min(own).max(-other);
        let expected = own - offset * falloff_ratio(bound, 0.1);

        assert_relative_eq!(blender.value(&p, 0, offset).unwrap(), expected);
        assert!(expected < own);
    }

    #[test]
    fn pair_with_static_uses_nearer_blocker() {
        let mut scene = Scene::new(2, 1);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(0.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Dynamic, 1, sphere(10.0, 1.0)).unwrap();
        scene.set_object(ObjectKind::Static, 0, sphere(-1.0, 0.5)).unwrap();
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();

        // Inside the static sphere the bound turns positive.
        let p = Pt3::new(-1.0, 0.0, 0.0);
        let own = -1.0;
        assert_relative_eq!(blender.value(&p, 0, 1.0).unwrap(), own);
    }

    #[test]
    fn triple_is_symmetric_in_siblings() {
        let build = |order: [f32; 3]| {
            let mut scene = Scene::new(3, 0);
            for (slot, x) in order.iter().enumerate() {
                scene
                    .set_object(ObjectKind::Dynamic, slot, sphere(*x, 1.5))
                    .unwrap();
            }
            scene
        };
        let a = build([0.0, 2.0, -2.0]);
        let b = build([0.0, -2.0, 2.0]);
        let blend_a = FieldBlender::new(&a, DEFAULT_FALLOFF_WIDTH).unwrap();
        let blend_b = FieldBlender::new(&b, DEFAULT_FALLOFF_WIDTH).unwrap();

        for p in sample_points() {
            assert_eq!(
                blend_a.value(&p, 0, 1.0).unwrap(),
                blend_b.value(&p, 0, 1.0).unwrap()
            );
        }
    }

    /// Blend recomputed from raw distances.
    fn hand_blend(own: f32, others: &[f32], sta: Option<f32>, offset: f32) -> f32 {
        let ub = own - offset;
        let dyn_bound = others
            .iter()
            .map(|o| ub - (o - offset))
            .fold(f32::NEG_INFINITY, f32::max);
        let oth = others.iter().copied().fold(f32::INFINITY, f32::min);
        let blocker = sta.map_or(oth, |s| oth.min(s));
        let bound = dyn_bound.min(own).max(-blocker);
        own - offset * falloff_ratio(bound, DEFAULT_FALLOFF_WIDTH)
    }

    /// Checks every dynamic slot at every point against `hand_blend`.
    /// Returns how many samples were actually attenuated.
    fn check_against_hand(dynamic: &[SphereSdf], obstacle: Option<SphereSdf>, points: &[Pt3]) -> usize {
        let mut scene = Scene::new(dynamic.len(), usize::from(obstacle.is_some()));
        for (slot, s) in dynamic.iter().enumerate() {
            scene.set_object(ObjectKind::Dynamic, slot, *s).unwrap();
        }
        if let Some(s) = obstacle {
            scene.set_object(ObjectKind::Static, 0, s).unwrap();
        }
        let blender = FieldBlender::new(&scene, DEFAULT_FALLOFF_WIDTH).unwrap();
        let offset = 1.3;

        let mut attenuated = 0;
        for p in points {
            for object in 0..dynamic.len() {
                let own = dynamic[object].distance(p);
                let others: Vec<f32> = dynamic
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != object)
                    .map(|(_, s)| s.distance(p))
                    .collect();
                let sta = obstacle.map(|s| s.distance(p));

                let expected = hand_blend(own, &others, sta, offset);
                let got = blender.value(p, object, offset).unwrap();
                assert_relative_eq!(got, expected, epsilon = 1e-6);
                if expected < own - 1e-3 {
                    attenuated += 1;
                }
            }
        }
        attenuated
    }

    fn three_spheres() -> [SphereSdf; 3] {
        [
            sphere(-1.5, 1.5),
            sphere(1.5, 1.5),
            SphereSdf::new(Pt3::new(0.0, 1.5, 0.0), 1.2),
        ]
    }

    fn interior_points() -> Vec<Pt3> {
        vec![
            Pt3::new(-1.5, 0.0, 0.0),
            Pt3::new(1.2, 0.4, 0.0),
            Pt3::new(-1.0, -0.3, 0.2),
            Pt3::new(0.1, 1.2, 0.1),
            Pt3::new(0.0, 0.2, 0.0),
            Pt3::new(2.0, -0.5, 0.3),
        ]
    }

    #[test]
    fn triple_matches_hand_computation() {
        let attenuated = check_against_hand(&three_spheres(), None, &interior_points());
        assert!(attenuated > 0);
    }

    #[test]
    fn triple_with_static_matches_hand_computation() {
        let obstacle = SphereSdf::new(Pt3::new(0.0, -2.0, 0.0), 1.0);
        let attenuated = check_against_hand(&three_spheres(), Some(obstacle), &interior_points());
        assert!(attenuated > 0);
    }

    #[test]
    fn pair_with_static_matches_hand_computation() {
        let pair = [sphere(-1.5, 1.5), sphere(1.5, 1.5)];
        let obstacle = SphereSdf::new(Pt3::new(0.0, -2.0, 0.0), 1.0);
        let attenuated = check_against_hand(&pair, Some(obstacle), &interior_points());
        assert!(attenuated > 0);
    }

    #[test]
    fn falloff_width_is_configurable() {
        let mut scene = Scene::new(1, 1);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(0.0, 2.0)).unwrap();
        scene.set_object(ObjectKind::Static, 0, sphere(10.0, 1.0)).unwrap();
        let narrow = FieldBlender::new(&scene, 0.1).unwrap();
        let wide = FieldBlender::new(&scene, 10.0).unwrap();

        let p = Pt3::origin();
        // bound = max(-2, -9) = -2
        assert_relative_eq!(
            narrow.value(&p, 0, 1.0).unwrap(),
            -2.0 - falloff_ratio(-2.0, 0.1)
        );
        assert_relative_eq!(
            wide.value(&p, 0, 1.0).unwrap(),
            -2.0 - falloff_ratio(-2.0, 10.0)
        );
    }

    #[test]
    fn rejects_missing_and_out_of_range() {
        let mut scene = Scene::new(2, 0);
        scene.set_object(ObjectKind::Dynamic, 0, sphere(0.0, 1.0)).unwrap();
        assert!(matches!(
            FieldBlender::new(&scene, 0.1),
            Err(IsoError::ObjectNotLoaded { slot: 1, .. })
        ));

        scene.set_object(ObjectKind::Dynamic, 1, sphere(3.0, 1.0)).unwrap();
        let blender = FieldBlender::new(&scene, 0.1).unwrap();
        assert!(blender.field(2, 0.0).is_err());
    }

    #[test]
    fn four_dynamic_objects_are_unsupported() {
        let scene = Scene::new(4, 0);
        assert!(matches!(
            FieldBlender::new(&scene, 0.1),
            Err(IsoError::UnsupportedObjectCount { dynamic: 4 })
        ));
    }
}
