//! ASCII-header + binary-little-endian-body PLY codec (spec.md §4.2).
//!
//! The writer always emits `x,y,z` and includes `nx,ny,nz` / `red,green,blue`
//! columns only when at least one point in the cloud carries that data. The
//! reader tolerates a header that omits either block.

use std::io::{BufRead, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use recon_models::{DensePointCloud, PointRecord, ReconError};

use crate::binary::FormatResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Property {
    X,
    Y,
    Z,
    Nx,
    Ny,
    Nz,
    Red,
    Green,
    Blue,
}

impl Property {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "x" => Self::X,
            "y" => Self::Y,
            "z" => Self::Z,
            "nx" => Self::Nx,
            "ny" => Self::Ny,
            "nz" => Self::Nz,
            "red" => Self::Red,
            "green" => Self::Green,
            "blue" => Self::Blue,
            _ => return None,
        })
    }
}

pub fn write_ply<W: Write>(w: &mut W, cloud: &DensePointCloud) -> FormatResult<()> {
    let has_normal = cloud.points.iter().any(|p| p.normal.is_some());
    let has_color = cloud.points.iter().any(|p| p.color.is_some());

    let mut header = String::new();
    header.push_str("ply\n");
    header.push_str("format binary_little_endian 1.0\n");
    header.push_str(&format!("element vertex {}\n", cloud.points.len()));
    header.push_str("property float x\nproperty float y\nproperty float z\n");
    if has_normal {
        header.push_str("property float nx\nproperty float ny\nproperty float nz\n");
    }
    if has_color {
        header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
    }
    header.push_str("end_header\n");

    w.write_all(header.as_bytes()).map_err(|e| ReconError::io_error("ply header", e))?;

    for point in &cloud.points {
        w.write_f32::<LittleEndian>(point.position[0] as f32)
            .and_then(|_| w.write_f32::<LittleEndian>(point.position[1] as f32))
            .and_then(|_| w.write_f32::<LittleEndian>(point.position[2] as f32))
            .map_err(|e| ReconError::io_error("ply vertex", e))?;

        if has_normal {
            let normal = point.normal.unwrap_or([0.0; 3]);
            w.write_f32::<LittleEndian>(normal[0] as f32)
                .and_then(|_| w.write_f32::<LittleEndian>(normal[1] as f32))
                .and_then(|_| w.write_f32::<LittleEndian>(normal[2] as f32))
                .map_err(|e| ReconError::io_error("ply normal", e))?;
        }

        if has_color {
            let color = point.color.unwrap_or([0, 0, 0]);
            w.write_u8(color[0])
                .and_then(|_| w.write_u8(color[1]))
                .and_then(|_| w.write_u8(color[2]))
                .map_err(|e| ReconError::io_error("ply color", e))?;
        }
    }
    Ok(())
}

pub fn read_ply<R: BufRead>(r: &mut R) -> FormatResult<DensePointCloud> {
    let mut line = String::new();
    r.read_line(&mut line).map_err(|e| ReconError::io_error("ply magic", e))?;
    if line.trim() != "ply" {
        return Err(ReconError::MalformedBinary("missing 'ply' magic line".into()));
    }

    let mut vertex_count: Option<usize> = None;
    let mut properties = Vec::new();
    loop {
        line.clear();
        let bytes_read = r.read_line(&mut line).map_err(|e| ReconError::io_error("ply header", e))?;
        if bytes_read == 0 {
            return Err(ReconError::MalformedBinary("ply header missing end_header".into()));
        }
        let trimmed = line.trim();
        if trimmed == "end_header" {
            break;
        }
        if let Some(rest) = trimmed.strip_prefix("format ") {
            if !rest.starts_with("binary_little_endian") {
                return Err(ReconError::MalformedBinary(format!("unsupported ply format: {rest}")));
            }
        } else if let Some(rest) = trimmed.strip_prefix("element vertex ") {
            vertex_count = Some(
                rest.trim()
                    .parse()
                    .map_err(|_| ReconError::MalformedBinary(format!("invalid vertex count: {rest}")))?,
            );
        } else if let Some(rest) = trimmed.strip_prefix("property ") {
            let mut parts = rest.split_whitespace();
            let _type_name = parts.next();
            let prop_name = parts
                .next()
                .ok_or_else(|| ReconError::MalformedBinary("property line missing name".into()))?;
            if let Some(prop) = Property::from_name(prop_name) {
                properties.push(prop);
            }
        }
    }

    let count = vertex_count.ok_or_else(|| ReconError::MalformedBinary("ply header missing element vertex".into()))?;
    let has_normal = properties.contains(&Property::Nx);
    let has_color = properties.contains(&Property::Red);

    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let mut xyz = [0f32; 3];
        let mut normal = [0f32; 3];
        let mut color = [0u8; 3];
        for prop in &properties {
            match prop {
                Property::X => xyz[0] = read_f32(r)?,
                Property::Y => xyz[1] = read_f32(r)?,
                Property::Z => xyz[2] = read_f32(r)?,
                Property::Nx => normal[0] = read_f32(r)?,
                Property::Ny => normal[1] = read_f32(r)?,
                Property::Nz => normal[2] = read_f32(r)?,
                Property::Red => color[0] = read_u8(r)?,
                Property::Green => color[1] = read_u8(r)?,
                Property::Blue => color[2] = read_u8(r)?,
            }
        }
        points.push(PointRecord {
            position: [xyz[0] as f64, xyz[1] as f64, xyz[2] as f64],
            normal: has_normal.then_some([normal[0] as f64, normal[1] as f64, normal[2] as f64]),
            color: has_color.then_some(color),
        });
    }

    Ok(DensePointCloud::new(points))
}

fn read_f32<R: Read>(r: &mut R) -> FormatResult<f32> {
    r.read_f32::<LittleEndian>()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ReconError::MalformedBinary("premature EOF in ply body".into()),
            _ => ReconError::io_error("ply body", e),
        })
}

fn read_u8<R: Read>(r: &mut R) -> FormatResult<u8> {
    r.read_u8().map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ReconError::MalformedBinary("premature EOF in ply body".into()),
        _ => ReconError::io_error("ply body", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_with_color_and_normal() {
        let cloud = DensePointCloud::new(vec![
            PointRecord { position: [1.0, 2.0, 3.0], color: Some([10, 20, 30]), normal: Some([0.0, 0.0, 1.0]) },
            PointRecord { position: [4.0, 5.0, 6.0], color: Some([40, 50, 60]), normal: Some([1.0, 0.0, 0.0]) },
        ]);
        let mut buf = Vec::new();
        write_ply(&mut buf, &cloud).unwrap();
        let decoded = read_ply(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.points.len(), 2);
        assert_eq!(decoded.points[0].color, Some([10, 20, 30]));
        assert!((decoded.points[0].position[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tolerates_absent_color_and_normal() {
        let cloud = DensePointCloud::new(vec![PointRecord { position: [1.0, 2.0, 3.0], color: None, normal: None }]);
        let mut buf = Vec::new();
        write_ply(&mut buf, &cloud).unwrap();
        assert!(!String::from_utf8_lossy(&buf).contains("property uchar red"));
        let decoded = read_ply(&mut Cursor::new(buf)).unwrap();
        assert_eq!(decoded.points[0].color, None);
        assert_eq!(decoded.points[0].normal, None);
    }
}
