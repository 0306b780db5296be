//! Marching cubes isosurface extraction
//!
//! Turns a [`ScalarField`] lattice into an edge-connected triangle mesh.
//! Two topology modes:
//!
//! - [`TopologyMode::TopologicallyControlled`] resolves the ambiguous cube
//!   configurations (classes 3, 4, 6, 7, 10, 12, 13) with face saddle tests
//!   and interior bilinear/trilinear tests, producing a 2-manifold,
//!   crack-free surface.
//! - [`TopologyMode::Classic`] looks up a fixed per-configuration triangle
//!   list without disambiguation.
//!
//! All vertices created by crossing the same lattice edge are shared between
//! the adjacent cells via three per-axis index grids, so the output is a
//! connected mesh rather than per-cell triangle soup.

use serde::{Deserialize, Serialize};

use crate::core::types::{UVec3, Vec3};
use crate::field::ScalarField;
use crate::mesh::tables;

/// Ambiguity-resolution strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyMode {
    /// Original marching cubes: fixed triangle list per configuration
    Classic,
    /// Topologically-controlled lookup with sub-case disambiguation
    #[default]
    TopologicallyControlled,
}

/// Position and unit normal of a surface vertex
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
}

/// Raw extraction output: shared vertex buffer + index triples
#[derive(Clone, Debug, Default)]
pub struct SurfaceBuffers {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
}

impl SurfaceBuffers {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

/// Marching cubes extractor configured with a topology mode.
///
/// Stateless between runs; per-run state lives in the internal pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarchingCubes {
    mode: TopologyMode,
}

impl MarchingCubes {
    pub fn new(mode: TopologyMode) -> Self {
        Self { mode }
    }

    /// Extract the isosurface of `field` at `isovalue`
    pub fn extract(&self, field: &ScalarField, isovalue: f32) -> SurfaceBuffers {
        let mut pass = Pass::new(field, isovalue, self.mode);
        pass.compute_intersection_points();
        pass.march();
        if pass.skipped_triangles > 0 {
            log::warn!(
                "marching cubes: skipped {} triangles with unresolved edge vertices",
                pass.skipped_triangles
            );
        }
        SurfaceBuffers {
            vertices: pass.vertices,
            triangles: pass.triangles,
        }
    }
}

/// Values this close to the isovalue are snapped away from zero so edge
/// interpolation never divides by zero.
const EPSILON: f32 = 1e-7;

/// One extraction run over a lattice
struct Pass<'a> {
    field: &'a ScalarField,
    iso: f32,
    mode: TopologyMode,
    size: UVec3,

    // Per-edge crossing vertex indices, -1 where the edge has no crossing.
    // Indexed like the sample lattice; entry (i,j,k) is the edge leaving that
    // sample in +x / +y / +z respectively.
    x_verts: Vec<i32>,
    y_verts: Vec<i32>,
    z_verts: Vec<i32>,

    vertices: Vec<Vertex>,
    triangles: Vec<[u32; 3]>,
    skipped_triangles: u32,

    // Active cell
    cube: [f32; 8],
    i: u32,
    j: u32,
    k: u32,
    case: u8,
    config: u8,
    subconfig: u8,
    tunnel_orientation: i32,
}

impl<'a> Pass<'a> {
    fn new(field: &'a ScalarField, iso: f32, mode: TopologyMode) -> Self {
        let size = field.dims();
        let cells = (size.x * size.y * size.z) as usize;
        Self {
            field,
            iso,
            mode,
            size,
            x_verts: vec![-1; cells],
            y_verts: vec![-1; cells],
            z_verts: vec![-1; cells],
            vertices: Vec::new(),
            triangles: Vec::new(),
            skipped_triangles: 0,
            cube: [0.0; 8],
            i: 0,
            j: 0,
            k: 0,
            case: 0,
            config: 0,
            subconfig: 0,
            tunnel_orientation: 0,
        }
    }

    /// Sample value relative to the isovalue
    #[inline]
    fn data(&self, i: u32, j: u32, k: u32) -> f32 {
        self.field.get(i, j, k) - self.iso
    }

    #[inline]
    fn grid_index(&self, i: u32, j: u32, k: u32) -> usize {
        (i + j * self.size.x + k * self.size.x * self.size.y) as usize
    }

    fn x_vert(&self, i: u32, j: u32, k: u32) -> i32 {
        self.x_verts[self.grid_index(i, j, k)]
    }

    fn y_vert(&self, i: u32, j: u32, k: u32) -> i32 {
        self.y_verts[self.grid_index(i, j, k)]
    }

    fn z_vert(&self, i: u32, j: u32, k: u32) -> i32 {
        self.z_verts[self.grid_index(i, j, k)]
    }

    // Central-difference gradient of the field, one-sided at the boundary.

    fn x_grad(&self, i: u32, j: u32, k: u32) -> f32 {
        if i > 0 {
            if i < self.size.x - 1 {
                (self.data(i + 1, j, k) - self.data(i - 1, j, k)) / 2.0
            } else {
                self.data(i, j, k) - self.data(i - 1, j, k)
            }
        } else {
            self.data(i + 1, j, k) - self.data(i, j, k)
        }
    }

    fn y_grad(&self, i: u32, j: u32, k: u32) -> f32 {
        if j > 0 {
            if j < self.size.y - 1 {
                (self.data(i, j + 1, k) - self.data(i, j - 1, k)) / 2.0
            } else {
                self.data(i, j, k) - self.data(i, j - 1, k)
            }
        } else {
            self.data(i, j + 1, k) - self.data(i, j, k)
        }
    }

    fn z_grad(&self, i: u32, j: u32, k: u32) -> f32 {
        if k > 0 {
            if k < self.size.z - 1 {
                (self.data(i, j, k + 1) - self.data(i, j, k - 1)) / 2.0
            } else {
                self.data(i, j, k) - self.data(i, j, k - 1)
            }
        } else {
            self.data(i, j, k + 1) - self.data(i, j, k)
        }
    }

    fn gradient(&self, i: u32, j: u32, k: u32) -> Vec3 {
        Vec3::new(self.x_grad(i, j, k), self.y_grad(i, j, k), self.z_grad(i, j, k))
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3) -> i32 {
        let n = normal.length();
        let normal = if n > 0.0 { normal / n } else { normal };
        self.vertices.push(Vertex { position, normal });
        (self.vertices.len() - 1) as i32
    }

    /// One full pass over every lattice edge: interpolate the crossing vertex
    /// and its gradient normal, record its index so adjacent cells share it.
    fn compute_intersection_points(&mut self) {
        for k in 0..self.size.z {
            for j in 0..self.size.y {
                for i in 0..self.size.x {
                    let snap = |v: f32| if v.abs() < EPSILON { EPSILON } else { v };

                    let c0 = snap(self.data(i, j, k));
                    let c1 = if i < self.size.x - 1 { snap(self.data(i + 1, j, k)) } else { c0 };
                    let c3 = if j < self.size.y - 1 { snap(self.data(i, j + 1, k)) } else { c0 };
                    let c4 = if k < self.size.z - 1 { snap(self.data(i, j, k + 1)) } else { c0 };

                    if c0 * c1 < 0.0 {
                        let u = c0 / (c0 - c1);
                        let position = Vec3::new(i as f32 + u, j as f32, k as f32);
                        let normal = self.gradient(i, j, k).lerp(self.gradient(i + 1, j, k), u);
                        let idx = self.push_vertex(position, normal);
                        let gi = self.grid_index(i, j, k);
                        self.x_verts[gi] = idx;
                    }
                    if c0 * c3 < 0.0 {
                        let u = c0 / (c0 - c3);
                        let position = Vec3::new(i as f32, j as f32 + u, k as f32);
                        let normal = self.gradient(i, j, k).lerp(self.gradient(i, j + 1, k), u);
                        let idx = self.push_vertex(position, normal);
                        let gi = self.grid_index(i, j, k);
                        self.y_verts[gi] = idx;
                    }
                    if c0 * c4 < 0.0 {
                        let u = c0 / (c0 - c4);
                        let position = Vec3::new(i as f32, j as f32, k as f32 + u);
                        let normal = self.gradient(i, j, k).lerp(self.gradient(i, j, k + 1), u);
                        let idx = self.push_vertex(position, normal);
                        let gi = self.grid_index(i, j, k);
                        self.z_verts[gi] = idx;
                    }
                }
            }
        }
    }

    /// Classify and tessellate every cell
    fn march(&mut self) {
        for k in 0..self.size.z - 1 {
            for j in 0..self.size.y - 1 {
                for i in 0..self.size.x - 1 {
                    self.i = i;
                    self.j = j;
                    self.k = k;

                    let mut lut_entry = 0u8;
                    for p in 0..8u32 {
                        let v = self.data(
                            i + ((p ^ (p >> 1)) & 1),
                            j + ((p >> 1) & 1),
                            k + ((p >> 2) & 1),
                        );
                        let v = if v.abs() < EPSILON { EPSILON } else { v };
                        self.cube[p as usize] = v;
                        if v > 0.0 {
                            lut_entry |= 1 << p;
                        }
                    }

                    self.process_cell(lut_entry);
                }
            }
        }
    }

    fn process_cell(&mut self, lut_entry: u8) {
        if self.mode == TopologyMode::Classic {
            // The classic table is keyed by below-isovalue corners
            self.emit(&tables::CASES_CLASSIC[255 - lut_entry as usize], -1);
            return;
        }

        self.case = tables::CASES[lut_entry as usize][0] as u8;
        self.config = tables::CASES[lut_entry as usize][1] as u8;
        self.subconfig = 0;
        self.tunnel_orientation = 0;

        if let Some(tiling) = self.select_tiling() {
            let needs_center = tiling.iter().take_while(|&&e| e >= 0).any(|&e| e == 12);
            let v12 = if needs_center { self.add_center_vertex() } else { -1 };
            self.emit(tiling, v12);
        }
    }

    /// Resolve the active cell's topology class into a concrete tiling.
    ///
    /// All triangle data lives in [`tables`]; this function only decides
    /// which row applies, running the face/interior tests the ambiguous
    /// classes require.
    fn select_tiling(&mut self) -> Option<&'static [i8]> {
        let config = self.config as usize;
        match self.case {
            0 => None,

            1 => Some(&tables::TILING1[config]),

            2 => Some(&tables::TILING2[config]),

            3 => {
                if self.test_face(tables::TEST3[config]) {
                    Some(&tables::TILING3_2[config]) // 3.2
                } else {
                    Some(&tables::TILING3_1[config]) // 3.1
                }
            }

            4 => {
                if self.test_interior(tables::TEST4[config]) {
                    Some(&tables::TILING4_1[config]) // 4.1.1
                } else {
                    Some(&tables::TILING4_2[config]) // 4.1.2
                }
            }

            5 => Some(&tables::TILING5[config]),

            6 => {
                if self.test_face(tables::TEST6[config][0]) {
                    Some(&tables::TILING6_2[config]) // 6.2
                } else if self.test_interior(tables::TEST6[config][1]) {
                    Some(&tables::TILING6_1_1[config]) // 6.1.1
                } else {
                    Some(&tables::TILING6_1_2[config]) // 6.1.2
                }
            }

            7 => {
                if self.test_face(tables::TEST7[config][0]) {
                    self.subconfig += 1;
                }
                if self.test_face(tables::TEST7[config][1]) {
                    self.subconfig += 2;
                }
                if self.test_face(tables::TEST7[config][2]) {
                    self.subconfig += 4;
                }
                match self.subconfig {
                    0 => Some(&tables::TILING7_1[config]),
                    1 => Some(&tables::TILING7_2[config][0]),
                    2 => Some(&tables::TILING7_2[config][1]),
                    3 => Some(&tables::TILING7_3[config][0]),
                    4 => Some(&tables::TILING7_2[config][2]),
                    5 => Some(&tables::TILING7_3[config][1]),
                    6 => Some(&tables::TILING7_3[config][2]),
                    _ => {
                        if self.test_interior(tables::TEST7[config][3]) {
                            Some(&tables::TILING7_4_1[config])
                        } else {
                            Some(&tables::TILING7_4_2[config])
                        }
                    }
                }
            }

            8 => Some(&tables::TILING8[config]),

            9 => Some(&tables::TILING9[config]),

            10 => {
                let test = &tables::TEST10[config];
                if self.test_face(test[0]) {
                    if self.test_face(test[1]) {
                        if self.test_interior(-test[2]) {
                            Some(&tables::TILING10_1_1_[config]) // 10.1.1
                        } else {
                            Some(&tables::TILING10_1_2[5 - config]) // 10.1.2
                        }
                    } else {
                        Some(&tables::TILING10_2[config]) // 10.2
                    }
                } else if self.test_face(test[1]) {
                    Some(&tables::TILING10_2_[config]) // 10.2
                } else if self.test_interior(test[2]) {
                    Some(&tables::TILING10_1_1[config]) // 10.1.1
                } else {
                    Some(&tables::TILING10_1_2[config]) // 10.1.2
                }
            }

            11 => Some(&tables::TILING11[config]),

            12 => {
                let test = &tables::TEST12[config];
                if self.test_face(test[0]) {
                    if self.test_face(test[1]) {
                        if self.test_interior(-test[2]) {
                            Some(&tables::TILING12_1_1_[config]) // 12.1.1
                        } else {
                            Some(&tables::TILING12_1_2[23 - config]) // 12.1.2
                        }
                    } else {
                        Some(&tables::TILING12_2[config]) // 12.2
                    }
                } else if self.test_face(test[1]) {
                    Some(&tables::TILING12_2_[config]) // 12.2
                } else if self.test_interior(test[2]) {
                    Some(&tables::TILING12_1_1[config]) // 12.1.1
                } else {
                    Some(&tables::TILING12_1_2[config]) // 12.1.2
                }
            }

            13 => self.select_tiling13(),

            14 => Some(&tables::TILING14[config]),

            _ => {
                log::warn!("marching cubes: impossible case {} (cube {:?})", self.case, self.cube);
                None
            }
        }
    }

    /// Case 13: six face tests feed a 64-entry sub-case table; sub-case 13.5
    /// additionally needs the trilinear interior (tunnel) test.
    fn select_tiling13(&mut self) -> Option<&'static [i8]> {
        let config = self.config as usize;
        for (bit, &face) in tables::TEST13[config].iter().take(6).enumerate() {
            if self.test_face(face) {
                self.subconfig += 1 << bit;
            }
        }

        let sub = tables::SUBCONFIG13[self.subconfig as usize];
        match sub {
            0 => Some(&tables::TILING13_1[config]),

            1..=6 => Some(&tables::TILING13_2[config][(sub - 1) as usize]),

            7..=18 => Some(&tables::TILING13_3[config][(sub - 7) as usize]),

            19..=22 => Some(&tables::TILING13_4[config][(sub - 19) as usize]),

            // 13.5: tunnel test decides between the 13.5.1 and 13.5.2
            // families, and the trilinear critical points orient the tunnel.
            23..=26 => {
                let s = (sub - 23) as usize;
                if self.interior_test_13() {
                    Some(&tables::TILING13_5_1[config][s])
                } else {
                    self.interior_distinguish_13();
                    if self.tunnel_orientation >= 0 {
                        Some(&tables::TILING13_5_2[config][s])
                    } else {
                        // Mirror-chirality tunnel with the same boundary arcs;
                        // the other config's row chords different faces and
                        // would not line up with the neighbouring cells.
                        Some(&tables::TILING13_5_2_[config][s])
                    }
                }
            }

            27..=38 => Some(&tables::TILING13_3_[config][(sub - 27) as usize]),

            39..=44 => Some(&tables::TILING13_2_[config][(sub - 39) as usize]),

            45 => Some(&tables::TILING13_1_[config]),

            _ => {
                log::warn!(
                    "marching cubes: impossible case 13 sub-configuration {} (cube {:?})",
                    self.subconfig, self.cube
                );
                None
            }
        }
    }

    /// Decide whether two surface components connect through an ambiguous
    /// face: the sign of the bilinear saddle value `A*C - B*D` over the
    /// face's corner values.
    fn test_face(&mut self, face: i8) -> bool {
        let c = &self.cube;
        let (a, b, cc, d) = match face.abs() {
            1 => (c[0], c[4], c[5], c[1]),
            2 => (c[1], c[5], c[6], c[2]),
            3 => (c[2], c[6], c[7], c[3]),
            4 => (c[3], c[7], c[4], c[0]),
            5 => (c[0], c[3], c[2], c[1]),
            6 => (c[4], c[7], c[6], c[5]),
            _ => {
                log::warn!("marching cubes: invalid face code {} (cube {:?})", face, self.cube);
                (0.0, 0.0, 0.0, 0.0)
            }
        };

        if (a * cc - b * d).abs() < EPSILON {
            return face >= 0;
        }
        // face and A invert signs together
        face as f32 * a * (a * cc - b * d) >= 0.0
    }

    /// Interior test for the ambiguous classes. Returns true when the cell
    /// interior is empty, i.e. the components do NOT connect through it and
    /// the x.1.1 tiling applies.
    ///
    /// For each candidate ambiguous face, find the lattice edge whose
    /// endpoints are sign-consistent with `s`, then check the sign of the
    /// bilinear patch at its parametric extremum along that edge.
    fn test_interior(&mut self, s: i8) -> bool {
        let mut empty = 0;
        match self.case {
            4 | 7 => {
                let s = if self.case == 7 { -s } else { s };
                for amb_face in [1, 2, 5] {
                    let edge = self.interior_ambiguity(amb_face, s);
                    empty += self.interior_ambiguity_verification(edge);
                }
            }
            6 => {
                let amb_face = tables::TEST6[self.config as usize][0].abs();
                let edge = self.interior_ambiguity(amb_face, s);
                empty += self.interior_ambiguity_verification(edge);
            }
            10 => {
                let amb_face = tables::TEST10[self.config as usize][0].abs();
                let edge = self.interior_ambiguity(amb_face, s);
                empty += self.interior_ambiguity_verification(edge);
            }
            12 => {
                for t in 0..2 {
                    let amb_face = tables::TEST12[self.config as usize][t].abs();
                    let edge = self.interior_ambiguity(amb_face, s);
                    empty += self.interior_ambiguity_verification(edge);
                }
            }
            _ => return false,
        }
        empty != 0
    }

    /// Pick the lattice edge whose endpoints are both on side `s`,
    /// perpendicular to the ambiguous face
    fn interior_ambiguity(&self, amb_face: i8, s: i8) -> i32 {
        let c = &self.cube;
        let s = s as f32;
        let mut edge = -1;
        match amb_face {
            1 | 3 => {
                if c[1] * s > 0.0 && c[7] * s > 0.0 {
                    edge = 4;
                }
                if c[0] * s > 0.0 && c[6] * s > 0.0 {
                    edge = 5;
                }
                if c[3] * s > 0.0 && c[5] * s > 0.0 {
                    edge = 6;
                }
                if c[2] * s > 0.0 && c[4] * s > 0.0 {
                    edge = 7;
                }
            }
            2 | 4 => {
                if c[1] * s > 0.0 && c[7] * s > 0.0 {
                    edge = 0;
                }
                if c[2] * s > 0.0 && c[4] * s > 0.0 {
                    edge = 1;
                }
                if c[3] * s > 0.0 && c[5] * s > 0.0 {
                    edge = 2;
                }
                if c[0] * s > 0.0 && c[6] * s > 0.0 {
                    edge = 3;
                }
            }
            0 | 5 | 6 => {
                if c[0] * s > 0.0 && c[6] * s > 0.0 {
                    edge = 8;
                }
                if c[1] * s > 0.0 && c[7] * s > 0.0 {
                    edge = 9;
                }
                if c[2] * s > 0.0 && c[4] * s > 0.0 {
                    edge = 10;
                }
                if c[3] * s > 0.0 && c[5] * s > 0.0 {
                    edge = 11;
                }
            }
            _ => {}
        }
        edge
    }

    /// Solve for the bilinear patch extremum along `edge`: 1 when the patch
    /// changes sign there (the channel pinches off), 0 when it persists
    fn interior_ambiguity_verification(&self, edge: i32) -> i32 {
        if !(0..12).contains(&edge) {
            return 0;
        }
        let c = &self.cube;
        // Four corner-pair rows (start, toward) of the cube edges parallel
        // to `edge`: At runs A0 -> A1, and the saddle is At*Ct - Bt*Dt.
        let [(a0, a1), (b0, b1), (c0, c1), (d0, d1)] = tables::INTERIOR_EDGE_PAIRS[edge as usize];

        let da = c[a1] - c[a0];
        let db = c[b1] - c[b0];
        let dc = c[c1] - c[c0];
        let dd = c[d1] - c[d0];

        let a = da * dc - db * dd;
        let b = c[c0] * da + c[a0] * dc - c[d0] * db - c[b0] * dd;

        if a > 0.0 {
            return 1;
        }
        let t = -b / (2.0 * a);
        if !(0.0..=1.0).contains(&t) {
            return 1;
        }

        let at = c[a0] + da * t;
        let bt = c[b0] + db * t;
        let ct = c[c0] + dc * t;
        let dt = c[d0] + dd * t;

        let verify = at * ct - bt * dt;
        if verify > 0.0 {
            return 0;
        }
        if verify < 0.0 {
            return 1;
        }
        0
    }

    /// Case 13 tunnel presence: both roots of the saddle quadratic on face 1
    /// must land inside the unit parametric range and give consistent
    /// in-cell positions for a tunnel to exist. Returns true if the interior
    /// is empty (no tunnel).
    fn interior_test_13(&self) -> bool {
        let c = &self.cube;
        let a = (c[0] - c[1]) * (c[7] - c[6]) - (c[4] - c[5]) * (c[3] - c[2]);
        let b = c[6] * (c[0] - c[1]) + c[1] * (c[7] - c[6])
            - c[2] * (c[4] - c[5])
            - c[5] * (c[3] - c[2]);
        let q = c[1] * c[6] - c[5] * c[2];

        let delta = b * b - 4.0 * a * q;
        // delta < 0 leaves t1/t2 NaN; every range check below then fails,
        // which is the wanted "no tunnel" answer.
        let t1 = (-b + delta.sqrt()) / (2.0 * a);
        let t2 = (-b - delta.sqrt()) / (2.0 * a);

        if t1 > 0.0 && t1 < 1.0 && t2 > 0.0 && t2 < 1.0 {
            let eval = |t: f32| {
                let at = c[1] + (c[0] - c[1]) * t;
                let bt = c[5] + (c[4] - c[5]) * t;
                let ct = c[6] + (c[7] - c[6]) * t;
                let dt = c[2] + (c[3] - c[2]) * t;
                let denom = at + ct - bt - dt;
                ((at - dt) / denom, (at - bt) / denom)
            };
            let (x1, y1) = eval(t1);
            let (x2, y2) = eval(t2);

            if x1 > 0.0 && x1 < 1.0 && x2 > 0.0 && x2 < 1.0
                && y1 > 0.0 && y1 < 1.0 && y2 > 0.0 && y2 < 1.0
            {
                return false;
            }
        }
        true
    }

    /// Case 13 tunnel orientation: locate the trilinear interpolant's
    /// critical points inside the cell and compare their signs. Sets
    /// `tunnel_orientation`. Cube values are already offset by the isovalue.
    fn interior_distinguish_13(&mut self) -> bool {
        let c = &self.cube;
        let a = -c[0] + c[1] + c[3] - c[2] + c[4] - c[5] - c[7] + c[6];
        let b = c[0] - c[1] - c[3] + c[2];
        let cc = c[0] - c[1] - c[4] + c[5];
        let d = c[0] - c[3] - c[4] + c[7];
        let e = -c[0] + c[1];
        let f = -c[0] + c[3];
        let g = -c[0] + c[4];
        let h = c[0];

        let dx = b * cc - a * e;
        let dy = b * d - a * f;
        let dz = cc * d - a * g;

        if dx == 0.0 || dy == 0.0 || dz == 0.0 {
            return true;
        }
        if dx * dy * dz < 0.0 {
            return true;
        }

        let disc = (dx * dy * dz).sqrt();
        let trilinear = |x: f32, y: f32, z: f32| {
            a * x * y * z + b * x * y + cc * x * z + d * y * z + e * x + f * y + g * z + h
        };
        let in_cell = |x: f32, y: f32, z: f32| {
            x > 0.0 && x < 1.0 && y > 0.0 && y < 1.0 && z > 0.0 && z < 1.0
        };

        let mut critical_values = Vec::with_capacity(2);
        for sign in [-1.0f32, 1.0] {
            let x = (-d * dx + sign * disc) / (a * dx);
            let y = (-cc * dy + sign * disc) / (a * dy);
            let z = (-b * dz + sign * disc) / (a * dz);
            if in_cell(x, y, z) {
                critical_values.push(trilinear(x, y, z));
            }
        }

        if critical_values.len() < 2 {
            return true;
        }

        let product = critical_values[0] * critical_values[1];
        if product > 0.0 {
            self.tunnel_orientation = if critical_values[0] > 0.0 { 1 } else { -1 };
        }
        product < 0.0
    }

    /// Interior (13th) vertex: mean of every edge vertex already computed
    /// for this cell, up to 12 contributors
    fn add_center_vertex(&mut self) -> i32 {
        let (i, j, k) = (self.i, self.j, self.k);
        let contributors = [
            self.x_vert(i, j, k),
            self.y_vert(i + 1, j, k),
            self.x_vert(i, j + 1, k),
            self.y_vert(i, j, k),
            self.x_vert(i, j, k + 1),
            self.y_vert(i + 1, j, k + 1),
            self.x_vert(i, j + 1, k + 1),
            self.y_vert(i, j, k + 1),
            self.z_vert(i, j, k),
            self.z_vert(i + 1, j, k),
            self.z_vert(i + 1, j + 1, k),
            self.z_vert(i, j + 1, k),
        ];

        let mut position = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        let mut count = 0u32;
        for vid in contributors {
            if vid >= 0 {
                let v = &self.vertices[vid as usize];
                position += v.position;
                normal += v.normal;
                count += 1;
            }
        }

        if count == 0 {
            log::warn!(
                "marching cubes: cell ({}, {}, {}) needs an interior vertex but has no edge vertices",
                i, j, k
            );
            return -1;
        }

        position /= count as f32;
        self.push_vertex(position, normal)
    }

    /// Emit the triangles of a tiling, 3 edge codes each, stopping at the
    /// -1 terminator. Edge codes 0-11 reference the shared per-edge vertices
    /// of the active cell; code 12 is the interior vertex.
    fn emit(&mut self, edges: &[i8], v12: i32) {
        let (i, j, k) = (self.i, self.j, self.k);
        let end = edges.iter().position(|&e| e == -1).unwrap_or(edges.len());
        for tri in edges[..end].chunks_exact(3) {
            let mut tv = [0i32; 3];
            for (slot, &edge) in tv.iter_mut().zip(tri) {
                *slot = match edge {
                    0 => self.x_vert(i, j, k),
                    1 => self.y_vert(i + 1, j, k),
                    2 => self.x_vert(i, j + 1, k),
                    3 => self.y_vert(i, j, k),
                    4 => self.x_vert(i, j, k + 1),
                    5 => self.y_vert(i + 1, j, k + 1),
                    6 => self.x_vert(i, j + 1, k + 1),
                    7 => self.y_vert(i, j, k + 1),
                    8 => self.z_vert(i, j, k),
                    9 => self.z_vert(i + 1, j, k),
                    10 => self.z_vert(i + 1, j + 1, k),
                    11 => self.z_vert(i, j + 1, k),
                    12 => v12,
                    _ => -1,
                };
            }

            if tv.iter().any(|&v| v < 0) {
                // A referenced edge holds no crossing vertex. Documented
                // defect of the source data near degenerate cells; drop the
                // triangle and keep extracting.
                self.skipped_triangles += 1;
                log::debug!(
                    "marching cubes: unresolved edge vertex in cell ({}, {}, {}), edges {:?}",
                    i, j, k, tri
                );
                continue;
            }

            self.triangles.push([tv[0] as u32, tv[1] as u32, tv[2] as u32]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Signed distance to a sphere, sampled on a lattice
    fn sphere_field(dims: UVec3, center: Vec3, radius: f32) -> ScalarField {
        ScalarField::from_fn(dims, |x, y, z| {
            (Vec3::new(x as f32, y as f32, z as f32) - center).length() - radius
        })
    }

    #[test]
    fn test_uniform_field_yields_nothing() {
        let mc = MarchingCubes::default();
        for fill in [1.0f32, -2.5] {
            let field = ScalarField::from_fn(UVec3::splat(4), |_, _, _| fill);
            let out = mc.extract(&field, 0.0);
            assert_eq!(out.vertex_count(), 0);
            assert_eq!(out.triangle_count(), 0);
        }
    }

    #[test]
    fn test_single_corner_yields_one_triangle() {
        // One corner below the isovalue on a single cell: case 1
        let field = ScalarField::from_fn(UVec3::splat(2), |x, y, z| {
            if (x, y, z) == (0, 0, 0) { -1.0 } else { 1.0 }
        });
        let out = MarchingCubes::default().extract(&field, 0.0);
        assert_eq!(out.triangle_count(), 1);
        assert_eq!(out.vertex_count(), 3);
    }

    #[test]
    fn test_triangle_indices_in_range() {
        let field = sphere_field(UVec3::splat(9), Vec3::splat(4.0), 3.2);
        for mode in [TopologyMode::TopologicallyControlled, TopologyMode::Classic] {
            let out = MarchingCubes::new(mode).extract(&field, 0.0);
            assert!(out.triangle_count() > 0);
            for tri in &out.triangles {
                for &idx in tri {
                    assert!((idx as usize) < out.vertex_count());
                }
            }
        }
    }

    #[test]
    fn test_normals_are_unit_length() {
        let field = sphere_field(UVec3::splat(7), Vec3::splat(3.0), 2.4);
        let out = MarchingCubes::default().extract(&field, 0.0);
        assert!(out.vertex_count() > 0);
        for v in &out.vertices {
            assert!((v.normal.length() - 1.0).abs() < 1e-4, "normal {:?}", v.normal);
        }
    }

    #[test]
    fn test_sphere_manifold() {
        // 3x3x3 samples (2x2x2 cells) of a radius-1.5 sphere SDF centered in
        // the lattice: every interior triangle edge must be shared by
        // exactly 2 triangles.
        let field = sphere_field(UVec3::splat(3), Vec3::splat(1.0), 1.5);
        let out = MarchingCubes::default().extract(&field, 0.0);
        assert!(out.vertex_count() > 0);
        assert!(out.triangle_count() > 0);

        let on_boundary = |v: &Vertex| {
            let p = v.position;
            [p.x, p.y, p.z]
                .iter()
                .any(|&c| c.abs() < 1e-5 || (c - 2.0).abs() < 1e-5)
        };

        let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in &out.triangles {
            for e in 0..3 {
                let a = tri[e];
                let b = tri[(e + 1) % 3];
                let key = (a.min(b), a.max(b));
                *edge_counts.entry(key).or_default() += 1;
            }
        }

        for (&(a, b), &count) in &edge_counts {
            let boundary =
                on_boundary(&out.vertices[a as usize]) && on_boundary(&out.vertices[b as usize]);
            if !boundary {
                assert_eq!(count, 2, "interior edge ({a}, {b}) shared by {count} triangles");
            }
        }
    }

    #[test]
    fn test_random_closed_fields_are_watertight() {
        // Random 6x6x6 fields with every boundary sample held positive: the
        // surface is closed, so every triangle edge (boundary included) must
        // be shared by exactly 2 triangles. Random interior samples reach the
        // ambiguous-face and tunnel tilings a smooth sphere never hits.
        fn xorshift(state: &mut u64) -> f32 {
            *state ^= *state << 13;
            *state ^= *state >> 7;
            *state ^= *state << 17;
            (*state >> 40) as f32 / (1u64 << 24) as f32
        }

        let mc = MarchingCubes::default();
        for trial in 0..200u64 {
            let mut state = 0x9e37_79b9_7f4a_7c15 ^ (trial << 1);
            let field = ScalarField::from_fn(UVec3::splat(6), |x, y, z| {
                let r = xorshift(&mut state);
                let boundary = [x, y, z].iter().any(|&c| c == 0 || c == 5);
                if boundary { 0.05 + 0.95 * r } else { -1.0 + 2.0 * r }
            });
            let out = mc.extract(&field, 0.0);

            let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();
            for tri in &out.triangles {
                for e in 0..3 {
                    let a = tri[e];
                    let b = tri[(e + 1) % 3];
                    *edge_counts.entry((a.min(b), a.max(b))).or_default() += 1;
                }
            }
            for (&(a, b), &count) in &edge_counts {
                assert_eq!(
                    count, 2,
                    "trial {trial}: edge ({a}, {b}) shared by {count} triangles"
                );
            }
        }
    }

    #[test]
    fn test_shared_face_is_crack_free() {
        // Extract two overlapping halves of one field; vertex positions on
        // the shared face must agree.
        let dims = UVec3::new(5, 5, 9);
        let center = Vec3::new(2.0, 2.0, 4.0);
        let field = ScalarField::from_fn(dims, |x, y, z| {
            (Vec3::new(x as f32, y as f32, z as f32) - center).length() - 3.1
        });

        let lower = ScalarField::from_fn(UVec3::new(5, 5, 5), |x, y, z| field.get(x, y, z));
        let upper = ScalarField::from_fn(UVec3::new(5, 5, 5), |x, y, z| field.get(x, y, z + 4));

        let mc = MarchingCubes::default();
        let lower_out = mc.extract(&lower, 0.0);
        let upper_out = mc.extract(&upper, 0.0);

        // Shared face: z = 4 in the lower half, z = 0 in the upper half
        let face_positions = |out: &SurfaceBuffers, z: f32, shift: f32| -> Vec<Vec3> {
            let mut positions: Vec<Vec3> = out
                .vertices
                .iter()
                .filter(|v| (v.position.z - z).abs() < 1e-5)
                .map(|v| v.position + Vec3::new(0.0, 0.0, shift))
                .collect();
            positions.sort_by(|a, b| {
                (a.x, a.y).partial_cmp(&(b.x, b.y)).unwrap()
            });
            positions
        };

        let lower_face = face_positions(&lower_out, 4.0, 0.0);
        let upper_face = face_positions(&upper_out, 0.0, 4.0);

        assert!(!lower_face.is_empty());
        assert_eq!(lower_face.len(), upper_face.len());
        for (a, b) in lower_face.iter().zip(&upper_face) {
            assert!((*a - *b).length() < 1e-4, "crack at {a:?} vs {b:?}");
        }
    }

    #[test]
    fn test_classic_mode_single_corner() {
        let field = ScalarField::from_fn(UVec3::splat(2), |x, y, z| {
            if (x, y, z) == (0, 0, 0) { -1.0 } else { 1.0 }
        });
        let out = MarchingCubes::new(TopologyMode::Classic).extract(&field, 0.0);
        assert_eq!(out.triangle_count(), 1);
    }

    #[test]
    fn test_nonzero_isovalue() {
        let field = ScalarField::from_fn(UVec3::splat(2), |x, y, z| {
            if (x, y, z) == (0, 0, 0) { 2.0 } else { 8.0 }
        });
        // All samples above 0, but one below iso = 5
        let out = MarchingCubes::default().extract(&field, 5.0);
        assert_eq!(out.triangle_count(), 1);
    }
}
