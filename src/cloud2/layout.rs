use std::collections::HashSet;
use std::convert::TryFrom;

use log::warn;

use crate::cloud2::data_types::{Endian, FieldDatatype, PointField};

/// One step of an unpacking plan.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LayoutOp {
    /// Advance the cursor by this many bytes without producing values.
    Skip(usize),
    /// Read `count` consecutive scalars of `datatype`.
    Read {
        datatype: FieldDatatype,
        count: usize,
    },
}

/// A field excluded from a plan because its datatype code is not in the
/// known table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedField {
    pub name: String,
    pub datatype: u8,
}

/// Precomputed unpacking plan for the point records of one cloud.
///
/// Built once per (field selection, endianness) combination and applied to
/// every record. Callers decoding many records must reuse one plan;
/// rebuilding it per point is what makes multi-million point clouds slow.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutPlan {
    pub(crate) ops: Vec<LayoutOp>,
    pub(crate) endian: Endian,
    pub(crate) names: Vec<String>,
    pub(crate) values_per_point: usize,
    pub(crate) skipped: Vec<SkippedField>,
}

impl LayoutPlan {
    /// Builds the plan for the given field descriptors.
    ///
    /// Fields participate when `field_names` is `None` or contains their
    /// name, and are laid out in ascending `offset` order regardless of
    /// their order in `fields` or in the selection; fields sharing an
    /// offset keep their input order. Gaps between consecutive fields
    /// become skip ops. A field with an unknown datatype code contributes
    /// no op and is reported through [`LayoutPlan::skipped`]; its byte
    /// width is unknowable, so the cursor stays where it was.
    pub fn build(fields: &[PointField], field_names: Option<&[&str]>, endian: Endian) -> Self {
        let selection: Option<HashSet<&str>> =
            field_names.map(|names| names.iter().copied().collect());
        let mut participating: Vec<&PointField> = fields
            .iter()
            .filter(|field| {
                selection
                    .as_ref()
                    .map_or(true, |names| names.contains(field.name.as_str()))
            })
            .collect();
        participating.sort_by_key(|field| field.offset);

        let mut ops = Vec::with_capacity(participating.len());
        let mut names = Vec::with_capacity(participating.len());
        let mut skipped = Vec::new();
        let mut values_per_point = 0;
        let mut cursor = 0;
        for field in participating {
            let offset = field.offset as usize;
            if cursor < offset {
                ops.push(LayoutOp::Skip(offset - cursor));
                cursor = offset;
            }
            match FieldDatatype::try_from(field.datatype) {
                Ok(datatype) => {
                    let count = field.count as usize;
                    ops.push(LayoutOp::Read { datatype, count });
                    cursor += datatype.size() * count;
                    values_per_point += count;
                    names.push(field.name.clone());
                }
                Err(e) => {
                    warn!("Skipping point field {:?}: {}", field.name, e);
                    skipped.push(SkippedField {
                        name: field.name.clone(),
                        datatype: field.datatype,
                    });
                }
            }
        }

        Self {
            ops,
            endian,
            names,
            values_per_point,
            skipped,
        }
    }

    pub fn ops(&self) -> &[LayoutOp] {
        &self.ops
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Names of the decoded fields in ascending offset order, one per read
    /// op.
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    /// Total number of scalar values one record decodes to.
    pub fn values_per_point(&self) -> usize {
        self.values_per_point
    }

    /// Fields excluded from the plan because their datatype code is
    /// unknown.
    pub fn skipped(&self) -> &[SkippedField] {
        &self.skipped
    }
}
