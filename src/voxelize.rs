//! Surface-mesh voxelization.
//!
//! Voxel centres sit on integer multiples of the pitch in the mesh's own
//! coordinates. A voxel is foreground when the surface passes through it or
//! when its centre lies inside the closed surface. Inside-ness is decided per
//! (x, y) column by casting a ray along Z and pairing up surface crossings.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek};
use std::path::Path;

use nalgebra::{Point3, Vector3};
use ndarray::Array3;

use crate::error::{Error, Result};

/// A triangle soup in physical units.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    triangles: Vec<[Point3<f64>; 3]>,
}

impl TriangleMesh {
    pub fn new(triangles: Vec<[Point3<f64>; 3]>) -> Self {
        Self { triangles }
    }

    /// Reads a binary or ASCII STL stream.
    pub fn from_stl<R: Read + Seek>(reader: &mut R) -> io::Result<Self> {
        let stl_reader = stl_io::create_stl_reader(reader)?;
        let mut triangles = Vec::new();
        for tri in stl_reader {
            let tri = tri?;
            let corner = |n: usize| {
                Point3::new(
                    tri.vertices[n][0] as f64,
                    tri.vertices[n][1] as f64,
                    tri.vertices[n][2] as f64,
                )
            };
            triangles.push([corner(0), corner(1), corner(2)]);
        }
        Ok(Self { triangles })
    }

    /// Writes the mesh as binary STL.
    pub fn write_stl<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let triangles: Vec<stl_io::Triangle> = self
            .triangles
            .iter()
            .map(|[a, b, c]| {
                let n = (b - a).cross(&(c - a));
                let n = if n.norm() > 0.0 { n.normalize() } else { n };
                let vertex = |p: &Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
                stl_io::Triangle {
                    normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
                    vertices: [vertex(a), vertex(b), vertex(c)],
                }
            })
            .collect();
        let mut file = BufWriter::new(File::create(path)?);
        stl_io::write_stl(&mut file, triangles.iter())
    }

    /// Closed axis-aligned box between `min` and `max`, outward facing.
    pub fn cuboid(min: Point3<f64>, max: Point3<f64>) -> Self {
        let corner = |i: usize| {
            Point3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        const QUADS: [[usize; 4]; 6] = [
            [0, 2, 3, 1], // z = min
            [4, 5, 7, 6], // z = max
            [0, 1, 5, 4], // y = min
            [2, 6, 7, 3], // y = max
            [0, 4, 6, 2], // x = min
            [1, 3, 7, 5], // x = max
        ];
        let mut triangles = Vec::with_capacity(12);
        for [a, b, c, d] in QUADS {
            triangles.push([corner(a), corner(b), corner(c)]);
            triangles.push([corner(a), corner(c), corner(d)]);
        }
        Self { triangles }
    }

    pub fn triangles(&self) -> &[[Point3<f64>; 3]] {
        &self.triangles
    }

    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Axis-aligned bounds of all vertices.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut corners = self.triangles.iter().flatten();
        let first = corners.next()?;
        let (mut min, mut max) = (*first, *first);
        for p in corners {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }
}

/// Binary occupancy of a mesh on a pitch-aligned grid.
#[derive(Debug, Clone)]
pub struct Voxelization {
    /// 1 inside or on the surface, 0 elsewhere.
    pub samples: Array3<f64>,
    /// Index of sample `[0, 0, 0]` in units of the pitch; its centre is at
    /// `first_index * pitch`.
    pub first_index: [i64; 3],
    pub pitch: f64,
}

impl Voxelization {
    /// Mesh-frame position of sample `[0, 0, 0]`.
    pub fn origin(&self) -> Point3<f64> {
        Point3::new(
            self.first_index[0] as f64 * self.pitch,
            self.first_index[1] as f64 * self.pitch,
            self.first_index[2] as f64 * self.pitch,
        )
    }
}

/// Voxelizes `mesh` at `pitch`, surface plus interior.
pub fn voxelize(mesh: &TriangleMesh, pitch: f64) -> Result<Voxelization> {
    if !pitch.is_finite() || pitch <= 0.0 {
        return Err(Error::InvalidSpacing([pitch; 3]));
    }
    let (min, max) = mesh.bounds().ok_or_else(|| {
        Error::InvalidGeometry("cannot voxelize an empty mesh".to_string())
    })?;
    let first = min.coords.map(|c| (c / pitch).floor() as i64);
    let last = max.coords.map(|c| (c / pitch).ceil() as i64);
    let size = [
        (last.x - first.x + 1) as usize,
        (last.y - first.y + 1) as usize,
        (last.z - first.z + 1) as usize,
    ];
    let mut voxels = Voxelization {
        samples: Array3::zeros((size[0], size[1], size[2])),
        first_index: [first.x, first.y, first.z],
        pitch,
    };
    fill_interior(mesh, &mut voxels);
    mark_surface(mesh, &mut voxels);
    log::debug!(
        "voxelized {} triangles into {:?} samples at pitch {}",
        mesh.len(),
        size,
        pitch
    );
    Ok(voxels)
}

/// Marks every voxel the surface passes through by sampling each triangle
/// densely enough that no voxel is skipped.
fn mark_surface(mesh: &TriangleMesh, voxels: &mut Voxelization) {
    let pitch = voxels.pitch;
    let origin = voxels.origin();
    let shape = voxels.samples.dim();
    let step = pitch / 2.0;
    for [a, b, c] in mesh.triangles() {
        let longest = (b - a).norm().max((c - a).norm()).max((c - b).norm());
        let n = ((longest / step).ceil() as usize).max(1);
        let (ab, ac) = ((b - a) / n as f64, (c - a) / n as f64);
        for u in 0..=n {
            for v in 0..=n - u {
                let p = a + ab * u as f64 + ac * v as f64;
                let idx = ((p - origin) / pitch).map(|x| x.round());
                if idx.iter().any(|x| *x < 0.0) {
                    continue;
                }
                let idx = (idx.x as usize, idx.y as usize, idx.z as usize);
                if idx.0 < shape.0 && idx.1 < shape.1 && idx.2 < shape.2 {
                    voxels.samples[idx] = 1.0;
                }
            }
        }
    }
}

/// Signed area test of `p` against the directed edge `a -> b` in the XY plane.
#[inline]
fn edge(a: &Point3<f64>, b: &Point3<f64>, x: f64, y: f64) -> f64 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

/// Tie rule for points exactly on an edge. A shared edge appears in opposite
/// directions in its two triangles, so exactly one of them claims the point.
#[inline]
fn owns_edge(a: &Point3<f64>, b: &Point3<f64>) -> bool {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

fn fill_interior(mesh: &TriangleMesh, voxels: &mut Voxelization) {
    let pitch = voxels.pitch;
    let [fx, fy, fz] = voxels.first_index;
    let (nx, ny, nz) = voxels.samples.dim();
    let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); nx * ny];

    for tri in mesh.triangles() {
        let [mut a, mut b, c] = *tri;
        let mut area = edge(&a, &b, c.x, c.y);
        if area == 0.0 {
            // parallel to the ray
            continue;
        }
        if area < 0.0 {
            std::mem::swap(&mut a, &mut b);
            area = -area;
        }
        let lo = a.coords.inf(&b.coords).inf(&c.coords);
        let hi = a.coords.sup(&b.coords).sup(&c.coords);
        let i0 = ((lo.x / pitch).ceil() as i64 - fx).max(0);
        let i1 = ((hi.x / pitch).floor() as i64 - fx).min(nx as i64 - 1);
        let j0 = ((lo.y / pitch).ceil() as i64 - fy).max(0);
        let j1 = ((hi.y / pitch).floor() as i64 - fy).min(ny as i64 - 1);
        for i in i0..=i1 {
            let x = (i + fx) as f64 * pitch;
            for j in j0..=j1 {
                let y = (j + fy) as f64 * pitch;
                let wa = edge(&b, &c, x, y);
                let wb = edge(&c, &a, x, y);
                let wc = edge(&a, &b, x, y);
                let inside = [(wa, &b, &c), (wb, &c, &a), (wc, &a, &b)]
                    .iter()
                    .all(|(w, p, q)| *w > 0.0 || (*w == 0.0 && owns_edge(p, q)));
                if inside {
                    let z = (wa * a.z + wb * b.z + wc * c.z) / area;
                    crossings[i as usize * ny + j as usize].push(z);
                }
            }
        }
    }

    for i in 0..nx {
        for j in 0..ny {
            let column = &mut crossings[i * ny + j];
            column.sort_by(f64::total_cmp);
            for pair in column.chunks_exact(2) {
                let k0 = ((pair[0] / pitch).ceil() as i64 - fz).max(0);
                let k1 = ((pair[1] / pitch).floor() as i64 - fz).min(nz as i64 - 1);
                for k in k0..=k1 {
                    voxels.samples[[i, j, k as usize]] = 1.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_is_solid() {
        let mesh = TriangleMesh::cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let voxels = voxelize(&mesh, 1.0).unwrap();
        assert_eq!(voxels.samples.dim(), (11, 11, 11));
        assert_eq!(voxels.first_index, [0, 0, 0]);
        assert_eq!(voxels.samples.iter().filter(|v| **v == 1.0).count(), 11 * 11 * 11);
    }

    #[test]
    fn interior_is_filled_away_from_the_surface() {
        let mesh = TriangleMesh::cuboid(Point3::new(2.2, 3.3, -4.1), Point3::new(9.7, 8.6, 4.4));
        let voxels = voxelize(&mesh, 0.5).unwrap();
        assert_eq!(voxels.first_index, [4, 6, -9]);
        let origin = voxels.origin();
        for ((i, j, k), v) in voxels.samples.indexed_iter() {
            let p = origin + Vector3::new(i as f64, j as f64, k as f64) * 0.5;
            let deep = p.x > 2.8 && p.x < 9.2 && p.y > 3.8 && p.y < 8.1 && p.z > -3.6 && p.z < 3.9;
            let far = p.x < 1.9 || p.x > 10.0 || p.y < 3.0 || p.y > 8.9 || p.z < -4.4 || p.z > 4.7;
            if deep {
                assert_eq!(*v, 1.0, "hole at {p:?}");
            }
            if far {
                assert_eq!(*v, 0.0, "spill at {p:?}");
            }
        }
    }

    #[test]
    fn open_surface_only_marks_the_surface() {
        // a single square, no enclosed volume
        let quad = TriangleMesh::cuboid(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 4.0))
            .triangles()[..2]
            .to_vec();
        let voxels = voxelize(&TriangleMesh::new(quad), 1.0).unwrap();
        assert_eq!(voxels.samples.dim(), (5, 5, 1));
        assert_eq!(voxels.samples.sum(), 25.0);
    }

    #[test]
    fn stl_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.stl");
        let mesh = TriangleMesh::cuboid(Point3::new(1.0, 2.0, 3.0), Point3::new(4.0, 5.0, 6.5));
        mesh.write_stl(&path).unwrap();
        let back = TriangleMesh::from_stl(&mut File::open(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 12);
        assert_eq!(back.bounds(), mesh.bounds());
    }

    #[test]
    fn rejects_bad_pitch_and_empty_mesh() {
        let mesh = TriangleMesh::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(matches!(voxelize(&mesh, 0.0), Err(Error::InvalidSpacing(_))));
        assert!(matches!(
            voxelize(&TriangleMesh::default(), 1.0),
            Err(Error::InvalidGeometry(_))
        ));
    }
}
