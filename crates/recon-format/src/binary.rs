//! Cameras/images/points3D binary codec (spec.md §4.2).
//!
//! Every file starts with a `u64` record count followed by fixed or
//! variable-length little-endian records. A round trip (read then write)
//! of a well-formed file produces byte-identical output.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use recon_models::{CameraModel, CameraModelKind, ImagePose, Observation, Point3D, ReconError, TrackEntry};

pub type FormatResult<T> = Result<T, ReconError>;

/// No-correspondence sentinel for an observation's point3d-id field.
const NO_CORRESPONDENCE: i64 = -1;

fn eof_aware(err: std::io::Error, context: &str) -> ReconError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ReconError::MalformedBinary(format!("premature EOF while reading {context}"))
    } else {
        ReconError::io_error(context, err)
    }
}

fn read_nul_terminated<R: Read>(r: &mut R) -> FormatResult<String> {
    let mut bytes = Vec::new();
    loop {
        let byte = r.read_u8().map_err(|e| eof_aware(e, "image name"))?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|_| ReconError::MalformedBinary("image name is not valid UTF-8".into()))
}

fn write_nul_terminated<W: Write>(w: &mut W, s: &str) -> FormatResult<()> {
    w.write_all(s.as_bytes())
        .and_then(|_| w.write_u8(0))
        .map_err(|e| ReconError::io_error("image name", e))
}

pub fn read_cameras<R: Read>(r: &mut R) -> FormatResult<Vec<CameraModel>> {
    let count = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "camera count"))?;
    let mut cameras = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "camera id"))?;
        let model_code = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "camera model"))?;
        let kind = CameraModelKind::from_u32(model_code)?;
        let width = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "camera width"))?;
        let height = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "camera height"))?;
        let mut params = Vec::with_capacity(kind.param_count());
        for _ in 0..kind.param_count() {
            params.push(r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "camera param"))?);
        }
        cameras.push(CameraModel { id, kind, width, height, params });
    }
    Ok(cameras)
}

pub fn write_cameras<W: Write>(w: &mut W, cameras: &[CameraModel]) -> FormatResult<()> {
    w.write_u64::<LittleEndian>(cameras.len() as u64)
        .map_err(|e| ReconError::io_error("camera count", e))?;
    for camera in cameras {
        w.write_u32::<LittleEndian>(camera.id)
            .and_then(|_| w.write_u32::<LittleEndian>(camera.kind.as_u32()))
            .and_then(|_| w.write_u64::<LittleEndian>(camera.width))
            .and_then(|_| w.write_u64::<LittleEndian>(camera.height))
            .map_err(|e| ReconError::io_error("camera record", e))?;
        if camera.params.len() != camera.kind.param_count() {
            return Err(ReconError::MalformedBinary(format!(
                "camera {} has {} params, expected {} for {:?}",
                camera.id,
                camera.params.len(),
                camera.kind.param_count(),
                camera.kind
            )));
        }
        for param in &camera.params {
            w.write_f64::<LittleEndian>(*param).map_err(|e| ReconError::io_error("camera param", e))?;
        }
    }
    Ok(())
}

pub fn read_images<R: Read>(r: &mut R) -> FormatResult<Vec<ImagePose>> {
    let count = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "image count"))?;
    let mut images = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "image id"))?;
        let qw = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "qw"))?;
        let qx = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "qx"))?;
        let qy = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "qy"))?;
        let qz = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "qz"))?;
        let tx = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "tx"))?;
        let ty = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "ty"))?;
        let tz = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "tz"))?;
        let camera_id = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "camera id ref"))?;
        let name = read_nul_terminated(r)?;

        let point_count = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "observation count"))?;
        let mut observations = Vec::with_capacity(point_count as usize);
        for _ in 0..point_count {
            let x = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "observation x"))?;
            let y = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "observation y"))?;
            let point3d_id = r.read_i64::<LittleEndian>().map_err(|e| eof_aware(e, "observation point3d id"))?;
            let point3d_id = if point3d_id == NO_CORRESPONDENCE {
                None
            } else if point3d_id < 0 {
                return Err(ReconError::MalformedBinary(format!(
                    "observation has negative point3d id {point3d_id}"
                )));
            } else {
                Some(point3d_id as u64)
            };
            observations.push(Observation { x, y, point3d_id });
        }

        images.push(ImagePose { id, qw, qx, qy, qz, tx, ty, tz, camera_id, name, observations });
    }
    Ok(images)
}

pub fn write_images<W: Write>(w: &mut W, images: &[ImagePose]) -> FormatResult<()> {
    w.write_u64::<LittleEndian>(images.len() as u64)
        .map_err(|e| ReconError::io_error("image count", e))?;
    for image in images {
        w.write_u32::<LittleEndian>(image.id)
            .and_then(|_| w.write_f64::<LittleEndian>(image.qw))
            .and_then(|_| w.write_f64::<LittleEndian>(image.qx))
            .and_then(|_| w.write_f64::<LittleEndian>(image.qy))
            .and_then(|_| w.write_f64::<LittleEndian>(image.qz))
            .and_then(|_| w.write_f64::<LittleEndian>(image.tx))
            .and_then(|_| w.write_f64::<LittleEndian>(image.ty))
            .and_then(|_| w.write_f64::<LittleEndian>(image.tz))
            .and_then(|_| w.write_u32::<LittleEndian>(image.camera_id))
            .map_err(|e| ReconError::io_error("image record", e))?;
        write_nul_terminated(w, &image.name)?;

        w.write_u64::<LittleEndian>(image.observations.len() as u64)
            .map_err(|e| ReconError::io_error("observation count", e))?;
        for obs in &image.observations {
            let point3d_id = obs.point3d_id.map(|id| id as i64).unwrap_or(NO_CORRESPONDENCE);
            w.write_f64::<LittleEndian>(obs.x)
                .and_then(|_| w.write_f64::<LittleEndian>(obs.y))
                .and_then(|_| w.write_i64::<LittleEndian>(point3d_id))
                .map_err(|e| ReconError::io_error("observation", e))?;
        }
    }
    Ok(())
}

pub fn read_points3d<R: Read>(r: &mut R) -> FormatResult<Vec<Point3D>> {
    let count = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "point count"))?;
    let mut points = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let id = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "point id"))?;
        let x = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "point x"))?;
        let y = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "point y"))?;
        let z = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "point z"))?;
        let r_ch = r.read_u8().map_err(|e| eof_aware(e, "point r"))?;
        let g_ch = r.read_u8().map_err(|e| eof_aware(e, "point g"))?;
        let b_ch = r.read_u8().map_err(|e| eof_aware(e, "point b"))?;
        let reprojection_error = r.read_f64::<LittleEndian>().map_err(|e| eof_aware(e, "reprojection error"))?;

        let track_length = r.read_u64::<LittleEndian>().map_err(|e| eof_aware(e, "track length"))?;
        let mut track = Vec::with_capacity(track_length as usize);
        for _ in 0..track_length {
            let image_id = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "track image id"))?;
            let observation_index = r.read_u32::<LittleEndian>().map_err(|e| eof_aware(e, "track obs index"))?;
            track.push(TrackEntry { image_id, observation_index });
        }

        points.push(Point3D { id, x, y, z, r: r_ch, g: g_ch, b: b_ch, reprojection_error, track });
    }
    Ok(points)
}

pub fn write_points3d<W: Write>(w: &mut W, points: &[Point3D]) -> FormatResult<()> {
    w.write_u64::<LittleEndian>(points.len() as u64)
        .map_err(|e| ReconError::io_error("point count", e))?;
    for point in points {
        w.write_u64::<LittleEndian>(point.id)
            .and_then(|_| w.write_f64::<LittleEndian>(point.x))
            .and_then(|_| w.write_f64::<LittleEndian>(point.y))
            .and_then(|_| w.write_f64::<LittleEndian>(point.z))
            .and_then(|_| w.write_u8(point.r))
            .and_then(|_| w.write_u8(point.g))
            .and_then(|_| w.write_u8(point.b))
            .and_then(|_| w.write_f64::<LittleEndian>(point.reprojection_error))
            .map_err(|e| ReconError::io_error("point record", e))?;

        w.write_u64::<LittleEndian>(point.track.len() as u64)
            .map_err(|e| ReconError::io_error("track length", e))?;
        for entry in &point.track {
            w.write_u32::<LittleEndian>(entry.image_id)
                .and_then(|_| w.write_u32::<LittleEndian>(entry.observation_index))
                .map_err(|e| ReconError::io_error("track entry", e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::CameraModelKind;

    #[test]
    fn cameras_round_trip_byte_identical() {
        let cameras = vec![
            CameraModel { id: 0, kind: CameraModelKind::Pinhole, width: 1920, height: 1080, params: vec![1000.0, 1000.0, 960.0, 540.0] },
            CameraModel { id: 1, kind: CameraModelKind::SimplePinhole, width: 640, height: 480, params: vec![500.0, 320.0, 240.0] },
        ];
        let mut buf = Vec::new();
        write_cameras(&mut buf, &cameras).unwrap();
        let decoded = read_cameras(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, cameras);

        let mut buf2 = Vec::new();
        write_cameras(&mut buf2, &decoded).unwrap();
        assert_eq!(buf, buf2);
    }

    #[test]
    fn unknown_camera_model_is_rejected() {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(999).unwrap();
        buf.write_u64::<LittleEndian>(10).unwrap();
        buf.write_u64::<LittleEndian>(10).unwrap();
        let result = read_cameras(&mut buf.as_slice());
        assert!(matches!(result, Err(ReconError::UnknownCameraModel(999))));
    }

    #[test]
    fn images_round_trip_with_no_correspondence_sentinel() {
        let images = vec![ImagePose {
            id: 3,
            qw: 1.0, qx: 0.0, qy: 0.0, qz: 0.0,
            tx: 1.0, ty: 2.0, tz: 3.0,
            camera_id: 0,
            name: "frame_000003.jpg".into(),
            observations: vec![
                Observation { x: 1.0, y: 2.0, point3d_id: Some(7) },
                Observation { x: 3.0, y: 4.0, point3d_id: None },
            ],
        }];
        let mut buf = Vec::new();
        write_images(&mut buf, &images).unwrap();
        let decoded = read_images(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, images);
    }

    #[test]
    fn points3d_round_trip() {
        let points = vec![Point3D {
            id: 0, x: 1.0, y: 2.0, z: 3.0, r: 10, g: 20, b: 30,
            reprojection_error: 0.42,
            track: vec![
                TrackEntry { image_id: 0, observation_index: 0 },
                TrackEntry { image_id: 1, observation_index: 2 },
            ],
        }];
        let mut buf = Vec::new();
        write_points3d(&mut buf, &points).unwrap();
        let decoded = read_points3d(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, points);
    }

    #[test]
    fn premature_eof_is_malformed_binary() {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(5).unwrap();
        let result = read_cameras(&mut buf.as_slice());
        assert!(matches!(result, Err(ReconError::MalformedBinary(_))));
    }
}
