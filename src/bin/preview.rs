//! Whole-planet preview mesh export
//!
//! Meshes the entire body in one pass and writes a Wavefront OBJ, the
//! out-of-engine equivalent of the editor preview.
//!
//! Usage: `preview [settings.json] [out.obj]`

use std::fs::File;
use std::io::{BufWriter, Write};

use lithos::core::error::Error;
use lithos::core::types::Result;
use lithos::mesh::{MeshData, generate_preview_mesh};
use lithos::streaming::TerrainSettings;

fn main() {
    lithos::core::logging::init();
    if let Err(e) = run() {
        log::error!("preview failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let settings_path = args.next();
    let out_path = args.next().unwrap_or_else(|| "planet.obj".to_string());

    let mut settings = match settings_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|e| Error::Config(format!("{path}: {e}")))?
        }
        None => TerrainSettings::default(),
    };
    settings.validate();

    log::info!(
        "meshing radius {} body, height scale {}",
        settings.radius,
        settings.noise_height_scale
    );
    let mesh = generate_preview_mesh(
        &settings.noise,
        settings.radius,
        settings.noise_height_scale,
        1,
        settings.topology,
    );

    write_obj(&mesh, &out_path)?;
    log::info!(
        "wrote {} vertices / {} triangles to {}",
        mesh.vertex_count(),
        mesh.triangle_count(),
        out_path
    );
    Ok(())
}

fn write_obj(mesh: &MeshData, path: &str) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for v in &mesh.vertices {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for n in &mesh.normals {
        writeln!(out, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    // OBJ indices are 1-based
    for t in mesh.triangles.chunks_exact(3) {
        writeln!(
            out,
            "f {0}//{0} {1}//{1} {2}//{2}",
            t[0] + 1,
            t[1] + 1,
            t[2] + 1
        )?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithos::core::types::{Vec2, Vec3};

    #[test]
    fn test_write_obj_layout() {
        let mesh = MeshData {
            vertices: vec![Vec3::X, Vec3::Y, Vec3::Z],
            normals: vec![Vec3::Z; 3],
            uv: vec![Vec2::ZERO; 3],
            triangles: vec![0, 1, 2],
            lod: 0,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        write_obj(&mesh, path.to_str().unwrap()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.iter().filter(|l| l.starts_with("v ")).count(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("vn ")).count(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("f ")).count(), 1);
        assert_eq!(lines.last(), Some(&"f 1//1 2//2 3//3"));
    }
}
