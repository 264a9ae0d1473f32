use std::io::Cursor;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::cloud2::data_types::{CloudMessage, Endian, FieldDatatype, PointValue};
use crate::cloud2::layout::{LayoutOp, LayoutPlan};

type Result<T> = std::result::Result<T, CloudReadError>;

/// Represents possible error scenarios when decoding point records from a
/// cloud message.
#[derive(Error, Debug)]
pub enum CloudReadError {
    /// Decoding a point ran past the end of the data buffer. The supplied
    /// geometry (width, height, point_step, row_step) does not match the
    /// buffer's actual length.
    #[error("point record at byte offset {offset} runs past the end of the {len} byte data buffer")]
    BufferUnderrun { offset: usize, len: usize },
    /// Represents an error with the data of the message.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Decodes one point record starting `offset` bytes into `data`, according
/// to the plan.
///
/// Skip ops advance the cursor without producing output; read ops append
/// their scalars in plan order. Running past the end of `data` is fatal for
/// this call and surfaces as [`CloudReadError::BufferUnderrun`].
pub fn decode_at(data: &[u8], offset: usize, plan: &LayoutPlan) -> Result<Vec<PointValue>> {
    let mut rdr = Cursor::new(data);
    rdr.set_position(offset as u64);
    let mut values = Vec::with_capacity(plan.values_per_point());
    for op in plan.ops() {
        match *op {
            LayoutOp::Skip(n) => {
                let position = rdr.position() + n as u64;
                rdr.set_position(position);
            }
            LayoutOp::Read { datatype, count } => {
                for _ in 0..count {
                    let value = match plan.endian() {
                        Endian::Big => read_value::<BigEndian>(&mut rdr, datatype),
                        Endian::Little => read_value::<LittleEndian>(&mut rdr, datatype),
                    };
                    values.push(value.map_err(|_| CloudReadError::BufferUnderrun {
                        offset,
                        len: data.len(),
                    })?);
                }
            }
        }
    }
    Ok(values)
}

fn read_value<B: ByteOrder>(
    rdr: &mut Cursor<&[u8]>,
    datatype: FieldDatatype,
) -> std::io::Result<PointValue> {
    use FieldDatatype::*;
    Ok(match datatype {
        I8 => PointValue::I8(rdr.read_i8()?),
        U8 => PointValue::U8(rdr.read_u8()?),
        I16 => PointValue::I16(rdr.read_i16::<B>()?),
        U16 => PointValue::U16(rdr.read_u16::<B>()?),
        I32 => PointValue::I32(rdr.read_i32::<B>()?),
        U32 => PointValue::U32(rdr.read_u32::<B>()?),
        F32 => PointValue::F32(rdr.read_f32::<B>()?),
        F64 => PointValue::F64(rdr.read_f64::<B>()?),
    })
}

/// Reads the points of a cloud message lazily.
///
/// When `field_names` is `None` every field participates; otherwise only
/// the named fields do, laid out in ascending offset order. With
/// `skip_nans` set, points carrying a NaN in any decoded value are dropped.
/// A non-empty `uvs` restricts the read to exactly those `(u, v)` grid
/// coordinates, in the given order; otherwise the whole grid is scanned in
/// row-major order.
pub fn read_points<'a>(
    cloud: &'a CloudMessage,
    field_names: Option<&[&str]>,
    skip_nans: bool,
    uvs: Option<Vec<(u32, u32)>>,
) -> PointsIter<'a> {
    let plan = LayoutPlan::build(&cloud.fields, field_names, cloud.endian());
    PointsIter::new(cloud, plan, skip_nans, uvs)
}

/// Lazy iterator over the decoded point records of one cloud.
///
/// Produced by [`read_points`]. Yields one record per point; a decode
/// failure is yielded once and ends the iteration.
pub struct PointsIter<'a> {
    cloud: &'a CloudMessage,
    plan: LayoutPlan,
    skip_nans: bool,
    mode: IterMode,
    done: bool,
}

enum IterMode {
    /// Row-major walk over the full grid. `offset` tracks the current
    /// record's start byte incrementally instead of remultiplying the
    /// strides at every cell.
    Grid { u: u32, v: u32, offset: usize },
    /// Walk over an explicit coordinate list.
    Coords { uvs: Vec<(u32, u32)>, index: usize },
}

impl<'a> PointsIter<'a> {
    /// Drives a prebuilt plan over the cloud. [`read_points`] is the
    /// common entry point; this constructor lets a caller that decodes
    /// many clouds with identical fields build the plan once and reuse it.
    pub fn new(
        cloud: &'a CloudMessage,
        plan: LayoutPlan,
        skip_nans: bool,
        uvs: Option<Vec<(u32, u32)>>,
    ) -> Self {
        let mode = match uvs {
            Some(uvs) if !uvs.is_empty() => IterMode::Coords { uvs, index: 0 },
            _ => IterMode::Grid {
                u: 0,
                v: 0,
                offset: 0,
            },
        };
        Self {
            cloud,
            plan,
            skip_nans,
            mode,
            done: false,
        }
    }

    /// The plan backing this iteration, including any skipped-field
    /// diagnostics.
    pub fn plan(&self) -> &LayoutPlan {
        &self.plan
    }

    fn next_offset(&mut self) -> Option<usize> {
        match &mut self.mode {
            IterMode::Grid { u, v, offset } => {
                if *v >= self.cloud.height || self.cloud.width == 0 {
                    return None;
                }
                let current = *offset;
                *u += 1;
                if *u >= self.cloud.width {
                    *u = 0;
                    *v += 1;
                    *offset = self.cloud.row_step as usize * *v as usize;
                } else {
                    *offset += self.cloud.point_step as usize;
                }
                Some(current)
            }
            IterMode::Coords { uvs, index } => {
                let &(u, v) = uvs.get(*index)?;
                *index += 1;
                Some(
                    self.cloud.row_step as usize * v as usize
                        + self.cloud.point_step as usize * u as usize,
                )
            }
        }
    }
}

impl Iterator for PointsIter<'_> {
    type Item = Result<Vec<PointValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let offset = match self.next_offset() {
                Some(offset) => offset,
                None => {
                    self.done = true;
                    return None;
                }
            };
            match decode_at(&self.cloud.data, offset, &self.plan) {
                Ok(values) => {
                    if self.skip_nans && values.iter().any(|value| value.is_nan()) {
                        continue;
                    }
                    return Some(Ok(values));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// One decoded point with its values addressable by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    names: Arc<Vec<String>>,
    values: Vec<PointValue>,
}

impl PointRecord {
    /// Field names, in the same order as [`PointRecord::values`].
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[PointValue] {
        &self.values
    }

    /// Looks up a value by field name.
    pub fn get(&self, name: &str) -> Option<PointValue> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index).copied()
    }
}

/// Reads the points of a cloud message into a list of named records.
///
/// Materializes [`read_points`]; position `i` of every record pairs with
/// the plan's `i`-th field name, in ascending offset order. A field with
/// `count > 1` produces more values than names and has no named
/// representation, which is an error here (the positional iterator handles
/// such fields fine). For more efficient access use [`read_points`]
/// directly.
pub fn read_points_list(
    cloud: &CloudMessage,
    field_names: Option<&[&str]>,
    skip_nans: bool,
    uvs: Option<Vec<(u32, u32)>>,
) -> Result<Vec<PointRecord>> {
    let iter = read_points(cloud, field_names, skip_nans, uvs);
    if iter.plan().values_per_point() != iter.plan().field_names().len() {
        return Err(CloudReadError::InvalidData(format!(
            "Cannot pair {} field names with {} values per point",
            iter.plan().field_names().len(),
            iter.plan().values_per_point()
        )));
    }
    let names = Arc::new(iter.plan().field_names().to_vec());
    iter.map(|point| {
        point.map(|values| PointRecord {
            names: Arc::clone(&names),
            values,
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud2::data_types::PointField;
    use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

    fn xyz_fields() -> Vec<PointField> {
        vec![
            PointField::new("x", 0, FieldDatatype::F32, 1),
            PointField::new("y", 4, FieldDatatype::F32, 1),
            PointField::new("z", 8, FieldDatatype::F32, 1),
        ]
    }

    fn cloud(width: u32, height: u32, point_step: u32, fields: Vec<PointField>, data: Vec<u8>) -> CloudMessage {
        CloudMessage {
            height,
            width,
            fields,
            is_bigendian: false,
            point_step,
            row_step: point_step * width,
            data,
            is_dense: true,
        }
    }

    /// A 2x2 grid of xyz points where x encodes the cell: x = v * 10 + u.
    fn grid_cloud() -> CloudMessage {
        let mut data = vec![];
        for v in 0..2u32 {
            for u in 0..2u32 {
                data.write_f32::<LittleEndian>((v * 10 + u) as f32).unwrap();
                data.write_f32::<LittleEndian>(1.0).unwrap();
                data.write_f32::<LittleEndian>(2.0).unwrap();
            }
        }
        cloud(2, 2, 12, xyz_fields(), data)
    }

    fn collect_values(iter: PointsIter) -> Vec<Vec<PointValue>> {
        iter.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn decode_skips_padding_bytes() {
        let fields = vec![
            PointField::new("a", 0, FieldDatatype::F32, 1),
            PointField::new("b", 8, FieldDatatype::F32, 1),
        ];
        let mut data = vec![];
        data.write_f32::<LittleEndian>(1.0).unwrap();
        data.extend_from_slice(&[0xAA, 0xAA, 0xAA, 0xAA]);
        data.write_f32::<LittleEndian>(2.0).unwrap();

        let cloud = cloud(1, 1, 12, fields, data);
        let points = collect_values(read_points(&cloud, None, false, None));
        assert_eq!(
            points,
            vec![vec![PointValue::F32(1.0), PointValue::F32(2.0)]]
        );
    }

    #[test]
    fn decode_at_honors_the_byte_offset() {
        let mut data = vec![0u8; 12];
        let mut point = vec![];
        point.write_f32::<LittleEndian>(7.5).unwrap();
        data.extend_from_slice(&point);

        let plan = LayoutPlan::build(
            &[PointField::new("x", 0, FieldDatatype::F32, 1)],
            None,
            Endian::Little,
        );
        let values = decode_at(&data, 12, &plan).unwrap();
        assert_eq!(values, vec![PointValue::F32(7.5)]);
    }

    #[test]
    fn selecting_fields_projects_each_point() {
        let all = collect_values(read_points(&grid_cloud(), None, false, None));
        let only_z = collect_values(read_points(&grid_cloud(), Some(&["z"]), false, None));
        assert_eq!(only_z.len(), all.len());
        for (point, full) in only_z.iter().zip(&all) {
            assert_eq!(point, &vec![full[2]]);
        }
    }

    #[test]
    fn selection_order_does_not_reorder_values() {
        let points = collect_values(read_points(&grid_cloud(), Some(&["z", "x"]), false, None));
        // Values come back in offset order (x before z) regardless of the
        // order the names were given in.
        assert_eq!(
            points[0],
            vec![PointValue::F32(0.0), PointValue::F32(2.0)]
        );
    }

    #[test]
    fn skip_nans_drops_points_with_nan_values() {
        let mut data = vec![];
        for x in [1.0f32, f32::NAN] {
            data.write_f32::<LittleEndian>(x).unwrap();
            data.write_f32::<LittleEndian>(2.0).unwrap();
            data.write_f32::<LittleEndian>(3.0).unwrap();
        }
        let cloud = cloud(1, 2, 12, xyz_fields(), data);

        let kept = collect_values(read_points(&cloud, None, true, None));
        assert_eq!(
            kept,
            vec![vec![
                PointValue::F32(1.0),
                PointValue::F32(2.0),
                PointValue::F32(3.0),
            ]]
        );

        let all = collect_values(read_points(&cloud, None, false, None));
        assert_eq!(all.len(), 2);
        assert!(all[1][0].is_nan());
    }

    #[test]
    fn integer_values_never_count_as_nan() {
        let fields = vec![PointField::new("ring", 0, FieldDatatype::U16, 1)];
        let mut data = vec![];
        data.write_u16::<LittleEndian>(0xFFFF).unwrap();
        let cloud = cloud(1, 1, 2, fields, data);

        let points = collect_values(read_points(&cloud, None, true, None));
        assert_eq!(points, vec![vec![PointValue::U16(0xFFFF)]]);
        assert_eq!(points[0][0].datatype(), FieldDatatype::U16);
    }

    #[test]
    fn uvs_are_read_in_the_given_order() {
        let points = collect_values(read_points(
            &grid_cloud(),
            Some(&["x"]),
            false,
            Some(vec![(1, 0), (0, 0)]),
        ));
        assert_eq!(
            points,
            vec![vec![PointValue::F32(1.0)], vec![PointValue::F32(0.0)]]
        );
    }

    #[test]
    fn empty_uvs_falls_back_to_the_grid_scan() {
        let points = collect_values(read_points(&grid_cloud(), Some(&["x"]), false, Some(vec![])));
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn grid_scan_is_row_major() {
        let points = collect_values(read_points(&grid_cloud(), Some(&["x"]), false, None));
        let xs: Vec<f64> = points.iter().map(|point| point[0].as_f64()).collect();
        assert_eq!(xs, vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn unknown_field_decodes_the_rest() {
        let fields = vec![
            PointField::new("x", 0, FieldDatatype::F32, 1),
            PointField {
                name: "mystery".to_string(),
                offset: 4,
                datatype: 99,
                count: 1,
            },
            PointField::new("z", 8, FieldDatatype::F32, 1),
        ];
        let mut data = vec![];
        data.write_f32::<LittleEndian>(1.0).unwrap();
        data.extend_from_slice(&[0xAA, 0xAA, 0xAA, 0xAA]);
        data.write_f32::<LittleEndian>(2.0).unwrap();
        let cloud = cloud(1, 1, 12, fields, data);

        let iter = read_points(&cloud, None, false, None);
        assert_eq!(iter.plan().skipped().len(), 1);
        assert_eq!(iter.plan().skipped()[0].name, "mystery");
        let points = collect_values(iter);
        assert_eq!(
            points,
            vec![vec![PointValue::F32(1.0), PointValue::F32(2.0)]]
        );
    }

    #[test]
    fn big_endian_clouds_decode_correctly() {
        let mut data = vec![];
        data.write_f32::<BigEndian>(1.5).unwrap();
        data.write_u32::<BigEndian>(0xDEADBEEF).unwrap();
        let fields = vec![
            PointField::new("x", 0, FieldDatatype::F32, 1),
            PointField::new("rgba", 4, FieldDatatype::U32, 1),
        ];
        let mut cloud = cloud(1, 1, 8, fields, data);
        cloud.is_bigendian = true;

        let points = collect_values(read_points(&cloud, None, false, None));
        assert_eq!(
            points,
            vec![vec![PointValue::F32(1.5), PointValue::U32(0xDEADBEEF)]]
        );
    }

    #[test]
    fn empty_grid_yields_nothing() {
        for (width, height) in [(0, 4), (4, 0), (0, 0)] {
            let cloud = cloud(width, height, 12, xyz_fields(), vec![]);
            let mut iter = read_points(&cloud, None, false, None);
            assert!(iter.next().is_none());
        }
    }

    #[test]
    fn geometry_past_the_buffer_is_a_buffer_underrun() {
        let mut data = vec![];
        data.write_f32::<LittleEndian>(1.0).unwrap();
        data.write_f32::<LittleEndian>(2.0).unwrap();
        data.write_f32::<LittleEndian>(3.0).unwrap();
        // Claims two points but holds one.
        let cloud = cloud(2, 1, 12, xyz_fields(), data);

        let mut iter = read_points(&cloud, None, false, None);
        assert!(iter.next().unwrap().is_ok());
        match iter.next().unwrap() {
            Err(CloudReadError::BufferUnderrun { offset: 12, len: 12 }) => {}
            other => panic!("Expected a buffer underrun, got {other:?}"),
        }
        // The error ends the iteration.
        assert!(iter.next().is_none());
    }

    #[test]
    fn reading_twice_yields_identical_sequences() {
        let first = collect_values(read_points(&grid_cloud(), Some(&["x", "z"]), false, None));
        let second = collect_values(read_points(&grid_cloud(), Some(&["x", "z"]), false, None));
        assert_eq!(first, second);
    }

    #[test]
    fn a_prebuilt_plan_can_be_reused() {
        let plan = LayoutPlan::build(&xyz_fields(), Some(&["x"]), Endian::Little);
        let cloud = grid_cloud();
        let first = collect_values(PointsIter::new(&cloud, plan.clone(), false, None));
        let second = collect_values(PointsIter::new(&cloud, plan, false, None));
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn named_records_resolve_fields_by_position() {
        let records = read_points_list(&grid_cloud(), Some(&["z", "x"]), false, None).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].names(), &["x", "z"]);
        assert_eq!(records[0].get("x"), Some(PointValue::F32(0.0)));
        assert_eq!(records[0].get("z"), Some(PointValue::F32(2.0)));
        assert_eq!(records[0].get("y"), None);
    }

    #[test]
    fn named_records_reject_multi_count_fields() {
        let fields = vec![PointField::new("xyz", 0, FieldDatatype::F32, 3)];
        let mut data = vec![];
        for value in [1.0f32, 2.0, 3.0] {
            data.write_f32::<LittleEndian>(value).unwrap();
        }
        let cloud = cloud(1, 1, 12, fields, data);

        match read_points_list(&cloud, None, false, None) {
            Err(CloudReadError::InvalidData(_)) => {}
            other => panic!("Expected invalid data, got {other:?}"),
        }
    }
}
