//! Shared mesh constructors for unit tests.

use std::f64::consts::PI;

use nalgebra::Point3;

/// Regular `n`×`n`-quad grid in the z = 0 plane, each quad split into two
/// triangles. Faces are emitted row-major, two per quad.
pub fn flat_grid(n: usize, spacing: f64) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let side = n + 1;
    let mut vertices = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            vertices.push(Point3::new(col as f64 * spacing, row as f64 * spacing, 0.0));
        }
    }

    let mut faces = Vec::with_capacity(2 * n * n);
    for row in 0..n {
        for col in 0..n {
            let a = row * side + col;
            let b = a + 1;
            let c = a + side + 1;
            let d = a + side;
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }

    (vertices, faces)
}

/// UV-dome hemisphere of the given radius: `segments` vertices per latitude
/// ring, `rings` rings from the equator up, one pole vertex. The equator
/// ring is the open boundary.
pub fn hemisphere(segments: usize, rings: usize, radius: f64) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    assert!(segments >= 3 && rings >= 2);

    let mut vertices = Vec::with_capacity(segments * rings + 1);
    for ring in 0..rings {
        let phi = ring as f64 / rings as f64 * (PI / 2.0);
        let (z, r) = (radius * phi.sin(), radius * phi.cos());
        for seg in 0..segments {
            let theta = seg as f64 / segments as f64 * 2.0 * PI;
            vertices.push(Point3::new(r * theta.cos(), r * theta.sin(), z));
        }
    }
    let pole = vertices.len();
    vertices.push(Point3::new(0.0, 0.0, radius));

    let mut faces = Vec::new();
    for ring in 0..rings - 1 {
        for seg in 0..segments {
            let a = ring * segments + seg;
            let b = ring * segments + (seg + 1) % segments;
            let c = (ring + 1) * segments + (seg + 1) % segments;
            let d = (ring + 1) * segments + seg;
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }
    let top = (rings - 1) * segments;
    for seg in 0..segments {
        let a = top + seg;
        let b = top + (seg + 1) % segments;
        faces.push([a, b, pole]);
    }

    (vertices, faces)
}

/// Square-based pyramid with an open base: four side triangles around the
/// apex at vertex index 4.
pub fn pyramid(height: f64) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.5, 0.5, height),
    ];
    let faces = vec![[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]];
    (vertices, faces)
}

/// Gabled roof: two planar slopes of four triangles each meeting at a
/// two-edge ridge. Developable, but the slopes' normals differ by 90°.
pub fn roof() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity(9);
    for row in 0..3 {
        for col in 0..3 {
            let x = col as f64 - 1.0;
            let z = if col == 1 { 1.0 } else { 0.0 };
            vertices.push(Point3::new(x, row as f64, z));
        }
    }

    let mut faces = Vec::with_capacity(8);
    for row in 0..2 {
        for col in 0..2 {
            let a = row * 3 + col;
            let b = a + 1;
            let c = a + 4;
            let d = a + 3;
            faces.push([a, b, c]);
            faces.push([a, c, d]);
        }
    }

    (vertices, faces)
}
