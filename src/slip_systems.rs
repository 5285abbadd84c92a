use crate::stress_strain::Tensor2;
use nalgebra::Vector3;

/// Number of slip systems per octahedral plane.
pub const SYSTEMS_PER_PLANE: usize = 3;

/// FCC {111}<110> systems as (plane normal, slip direction), grouped in
/// triples sharing a plane. The first triple lies on (111).
const FCC_OCTAHEDRAL: [([f64; 3], [f64; 3]); 12] = [
    ([1.0, 1.0, 1.0], [0.0, 1.0, -1.0]),
    ([1.0, 1.0, 1.0], [-1.0, 0.0, 1.0]),
    ([1.0, 1.0, 1.0], [1.0, -1.0, 0.0]),
    ([-1.0, 1.0, 1.0], [1.0, 0.0, 1.0]),
    ([-1.0, 1.0, 1.0], [1.0, 1.0, 0.0]),
    ([-1.0, 1.0, 1.0], [0.0, 1.0, -1.0]),
    ([1.0, -1.0, 1.0], [0.0, 1.0, 1.0]),
    ([1.0, -1.0, 1.0], [1.0, 1.0, 0.0]),
    ([1.0, -1.0, 1.0], [1.0, 0.0, -1.0]),
    ([1.0, 1.0, -1.0], [0.0, 1.0, 1.0]),
    ([1.0, 1.0, -1.0], [1.0, 0.0, 1.0]),
    ([1.0, 1.0, -1.0], [1.0, -1.0, 0.0]),
];

/// Slip geometry of one crystal in the lattice frame. Rotated quantities are
/// produced by [`SlipSystems::rotated`].
#[derive(Debug, Clone)]
pub struct SlipSystems {
    normals: Vec<Vector3<f64>>,
    directions: Vec<Vector3<f64>>,
}

/// Slip geometry in the sample frame.
#[derive(Debug, Clone, Default)]
pub struct RotatedSlipSystems {
    /// Schmid tensors `d (x) n`
    pub flow_direction: Vec<Tensor2>,
    /// direction of edge dislocation motion (the slip direction)
    pub edge_direction: Vec<Vector3<f64>>,
    /// direction of screw dislocation motion (`d x n`)
    pub screw_direction: Vec<Vector3<f64>>,
}

impl SlipSystems {
    pub fn fcc_octahedral() -> Self {
        let (normals, directions) = FCC_OCTAHEDRAL
            .iter()
            .map(|(n, d)| (Vector3::from(*n).normalize(), Vector3::from(*d).normalize()))
            .unzip();
        Self {
            normals,
            directions,
        }
    }

    pub fn len(&self) -> usize {
        self.normals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normals.is_empty()
    }

    /// Index of the slip plane the system belongs to.
    pub fn plane(system: usize) -> usize {
        system / SYSTEMS_PER_PLANE
    }

    pub fn rotated(&self, crystal_rotation: &Tensor2) -> RotatedSlipSystems {
        let mut rotated = RotatedSlipSystems::default();
        for (n, d) in self.normals.iter().zip(&self.directions) {
            let n = crystal_rotation * n;
            let d = crystal_rotation * d;
            rotated.flow_direction.push(d * n.transpose());
            rotated.edge_direction.push(d);
            rotated.screw_direction.push(d.cross(&n));
        }
        rotated
    }
}
