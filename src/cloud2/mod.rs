//! Organized point-cloud message decoding.
//!
//! A cloud message carries its points as one opaque byte buffer plus a list
//! of field descriptors giving each dimension's name, byte offset, datatype
//! code and scalar count. This module builds an unpacking plan from those
//! descriptors once per cloud and applies it lazily to every point record,
//! over the full height×width grid or over an explicit coordinate list.
//!
//! # Examples
//!
//! ## Reading every point
//! ```
//! use cloudtk::cloud2::{read_points, CloudMessage, FieldDatatype, PointField};
//!
//! let cloud = CloudMessage {
//!     height: 1,
//!     width: 2,
//!     fields: vec![PointField::new("x", 0, FieldDatatype::F32, 1)],
//!     is_bigendian: false,
//!     point_step: 4,
//!     row_step: 8,
//!     data: [1.0f32.to_le_bytes(), 2.0f32.to_le_bytes()].concat(),
//!     is_dense: true,
//! };
//!
//! for point in read_points(&cloud, None, false, None) {
//!     println!("{:?}", point.unwrap());
//! }
//! ```
//!
//! ## Reading a named subset, dropping NaN points
//! ```
//! use cloudtk::cloud2::{read_points_list, CloudMessage, CloudReadError, FieldDatatype, PointField};
//!
//! fn main() -> Result<(), CloudReadError> {
//!     let cloud = CloudMessage {
//!         height: 1,
//!         width: 1,
//!         fields: vec![
//!             PointField::new("x", 0, FieldDatatype::F32, 1),
//!             PointField::new("y", 4, FieldDatatype::F32, 1),
//!         ],
//!         is_bigendian: false,
//!         point_step: 8,
//!         row_step: 8,
//!         data: [3.0f32.to_le_bytes(), 4.0f32.to_le_bytes()].concat(),
//!         is_dense: true,
//!     };
//!
//!     for point in read_points_list(&cloud, Some(&["x"]), true, None)? {
//!         println!("x = {:?}", point.get("x"));
//!     }
//!     Ok(())
//! }
//! ```

mod data_types;
mod layout;
mod reader;

pub use data_types::*;
pub use layout::{LayoutOp, LayoutPlan, SkippedField};
pub use reader::{
    decode_at, read_points, read_points_list, CloudReadError, PointRecord, PointsIter,
};
