//! On-disk layout per `spec.md` §6: one metadata descriptor, per-column
//! raw-values and null-mask files, and per-column index files, each a
//! small header followed by the concatenated bitvector bodies. Built on
//! `bitindex_bitvec`'s `Reader`/`Writer` abstractions and `Bitvector`'s
//! own `encode`/`decode`, so a bitmap's on-disk representation is
//! identical whether it lives inside an index file or stands alone as a
//! null mask.

use std::fs;
use std::path::{Path, PathBuf};

use bitindex_base::{kind_err, Kind, Result};
use bitindex_bitvec::{Bitvector, FileReader, FileWriter, Reader, Writer};
use bitindex_column::{Column, ColumnKind, ColumnStorage};
use bitindex_eval::PartitionSource;
use bitindex_index::{BinLayout, BinnedIndex};
use bitindex_mesh::MeshShape;

use crate::metadata::{ColumnMeta, PartitionMetadata};
use crate::partition::Partition;

fn io_err(e: std::io::Error) -> bitindex_base::Error {
    kind_err(Kind::Io, e.to_string())
}

fn metadata_path(dir: &Path) -> PathBuf {
    dir.join("metadata.bin")
}
fn values_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{column}.values"))
}
fn nulls_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{column}.nulls"))
}
fn index_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{column}.index"))
}

/// Write every file a partition's on-disk layout requires into `dir`,
/// creating it if absent. `dir` must not already contain these files —
/// callers wanting to overwrite an existing partition remove the
/// directory first, per `FileWriter::try_create_non_existing`'s
/// no-clobber contract.
pub fn write_partition(dir: &Path, partition: &Partition) -> Result<()> {
    fs::create_dir_all(dir).map_err(io_err)?;
    let metadata = partition.metadata();

    let mut meta_w = FileWriter::try_create_non_existing(metadata_path(dir)).map_err(io_err)?;
    write_metadata(&mut meta_w, &metadata)?;
    meta_w.flush().map_err(io_err)?;

    for column_meta in &metadata.columns {
        let column = partition.column(&column_meta.name)?;

        let mut values_w = FileWriter::try_create_non_existing(values_path(dir, &column_meta.name)).map_err(io_err)?;
        write_values(&mut values_w, column.storage())?;
        values_w.flush().map_err(io_err)?;

        let mut nulls_w = FileWriter::try_create_non_existing(nulls_path(dir, &column_meta.name)).map_err(io_err)?;
        column.null_mask().encode(&mut nulls_w)?;
        nulls_w.flush().map_err(io_err)?;

        if let Some(index) = partition.index(&column_meta.name) {
            let mut index_w = FileWriter::try_create_non_existing(index_path(dir, &column_meta.name)).map_err(io_err)?;
            write_index(&mut index_w, index)?;
            index_w.flush().map_err(io_err)?;
        }
    }
    Ok(())
}

/// Read back a partition written by `write_partition`.
pub fn read_partition(dir: &Path) -> Result<Partition> {
    let mut meta_r = FileReader::try_open_existing(metadata_path(dir)).map_err(io_err)?;
    let metadata = read_metadata(&mut meta_r)?;

    let mut partition = Partition::new(metadata.row_count);
    if let Some(dims) = metadata.mesh_shape.clone() {
        partition = partition.with_mesh_shape(MeshShape::new(dims)?)?;
    }

    for column_meta in &metadata.columns {
        let mut values_r = FileReader::try_open_existing(values_path(dir, &column_meta.name)).map_err(io_err)?;
        let storage = read_values(&mut values_r, column_meta.kind, metadata.row_count)?;

        let mut nulls_r = FileReader::try_open_existing(nulls_path(dir, &column_meta.name)).map_err(io_err)?;
        let null_mask = Bitvector::decode(&mut nulls_r)?;

        let column = Column::with_null_mask(storage, null_mask)?;
        partition.add_column(column_meta.name.clone(), column)?;

        let idx_path = index_path(dir, &column_meta.name);
        if idx_path.exists() {
            let mut index_r = FileReader::try_open_existing(idx_path).map_err(io_err)?;
            let index = read_index(&mut index_r)?;
            partition.add_index(column_meta.name.clone(), index);
        }
    }
    Ok(partition)
}

fn kind_tag(kind: ColumnKind) -> (u8, u16) {
    match kind {
        ColumnKind::I8 => (0, 0),
        ColumnKind::I16 => (1, 0),
        ColumnKind::I32 => (2, 0),
        ColumnKind::I64 => (3, 0),
        ColumnKind::U8 => (4, 0),
        ColumnKind::U16 => (5, 0),
        ColumnKind::U32 => (6, 0),
        ColumnKind::U64 => (7, 0),
        ColumnKind::F32 => (8, 0),
        ColumnKind::F64 => (9, 0),
        ColumnKind::Category { width } => (10, width),
        ColumnKind::Text => (11, 0),
    }
}

fn kind_from_tag(tag: u8, width: u16) -> Result<ColumnKind> {
    Ok(match tag {
        0 => ColumnKind::I8,
        1 => ColumnKind::I16,
        2 => ColumnKind::I32,
        3 => ColumnKind::I64,
        4 => ColumnKind::U8,
        5 => ColumnKind::U16,
        6 => ColumnKind::U32,
        7 => ColumnKind::U64,
        8 => ColumnKind::F32,
        9 => ColumnKind::F64,
        10 => ColumnKind::Category { width },
        11 => ColumnKind::Text,
        other => return Err(kind_err(Kind::Decode, format!("unknown column kind tag {other}"))),
    })
}

fn write_metadata(w: &mut impl Writer, meta: &PartitionMetadata) -> Result<()> {
    w.write_all(&meta.row_count.to_le_bytes()).map_err(io_err)?;
    w.write_all(&(meta.columns.len() as u32).to_le_bytes()).map_err(io_err)?;
    for col in &meta.columns {
        let name_bytes = col.name.as_bytes();
        w.write_all(&(name_bytes.len() as u16).to_le_bytes()).map_err(io_err)?;
        w.write_all(name_bytes).map_err(io_err)?;
        let (tag, width) = kind_tag(col.kind);
        w.write_all(&[tag]).map_err(io_err)?;
        w.write_all(&width.to_le_bytes()).map_err(io_err)?;
    }
    match &meta.mesh_shape {
        None => w.write_all(&[0u8]).map_err(io_err)?,
        Some(dims) => {
            w.write_all(&[1u8]).map_err(io_err)?;
            w.write_all(&(dims.len() as u32).to_le_bytes()).map_err(io_err)?;
            for &d in dims {
                w.write_all(&d.to_le_bytes()).map_err(io_err)?;
            }
        }
    }
    Ok(())
}

fn read_metadata(r: &mut impl Reader) -> Result<PartitionMetadata> {
    let row_count = meta_u32(r)?;
    let n_columns = meta_u32(r)?;
    let mut columns = Vec::with_capacity(n_columns as usize);
    for _ in 0..n_columns {
        let name_len = meta_u16(r)? as usize;
        let mut name_buf = vec![0u8; name_len];
        r.read_exact(&mut name_buf).map_err(io_err)?;
        let name = String::from_utf8(name_buf)
            .map_err(|e| kind_err(Kind::Decode, format!("column name is not valid utf-8: {e}")))?;
        let mut tag_buf = [0u8; 1];
        r.read_exact(&mut tag_buf).map_err(io_err)?;
        let width = meta_u16(r)?;
        let kind = kind_from_tag(tag_buf[0], width)?;
        columns.push(ColumnMeta { name, kind });
    }
    let mut mesh_flag = [0u8; 1];
    r.read_exact(&mut mesh_flag).map_err(io_err)?;
    let mesh_shape = if mesh_flag[0] == 0 {
        None
    } else {
        let ndim = meta_u32(r)? as usize;
        let mut dims = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            dims.push(meta_u32(r)?);
        }
        Some(dims)
    };
    Ok(PartitionMetadata { row_count, columns, mesh_shape })
}

fn meta_u32(r: &mut impl Reader) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| kind_err(Kind::Decode, format!("truncated metadata: {e}")))?;
    Ok(u32::from_le_bytes(buf))
}
fn meta_u16(r: &mut impl Reader) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).map_err(|e| kind_err(Kind::Decode, format!("truncated metadata: {e}")))?;
    Ok(u16::from_le_bytes(buf))
}

macro_rules! numeric_rw {
    ($write_fn:ident, $read_fn:ident, $t:ty) => {
        fn $write_fn(w: &mut impl Writer, v: &[$t]) -> Result<()> {
            for x in v {
                w.write_all(&x.to_le_bytes()).map_err(io_err)?;
            }
            Ok(())
        }
        fn $read_fn(r: &mut impl Reader, row_count: u32) -> Result<Vec<$t>> {
            let mut v = Vec::with_capacity(row_count as usize);
            for _ in 0..row_count {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                r.read_exact(&mut buf).map_err(|e| kind_err(Kind::Decode, format!("truncated column values: {e}")))?;
                v.push(<$t>::from_le_bytes(buf));
            }
            Ok(v)
        }
    };
}

numeric_rw!(write_i8, read_i8, i8);
numeric_rw!(write_i16, read_i16, i16);
numeric_rw!(write_i32, read_i32, i32);
numeric_rw!(write_i64, read_i64, i64);
numeric_rw!(write_u8, read_u8, u8);
numeric_rw!(write_u16, read_u16, u16);
numeric_rw!(write_u32, read_u32, u32);
numeric_rw!(write_u64, read_u64, u64);
numeric_rw!(write_f32, read_f32, f32);
numeric_rw!(write_f64, read_f64, f64);

fn write_values(w: &mut impl Writer, storage: &ColumnStorage) -> Result<()> {
    match storage {
        ColumnStorage::I8(v) => write_i8(w, v),
        ColumnStorage::I16(v) => write_i16(w, v),
        ColumnStorage::I32(v) => write_i32(w, v),
        ColumnStorage::I64(v) => write_i64(w, v),
        ColumnStorage::U8(v) => write_u8(w, v),
        ColumnStorage::U16(v) => write_u16(w, v),
        ColumnStorage::U32(v) => write_u32(w, v),
        ColumnStorage::U64(v) => write_u64(w, v),
        ColumnStorage::F32(v) => write_f32(w, v),
        ColumnStorage::F64(v) => write_f64(w, v),
        ColumnStorage::Category { data, .. } => w.write_all(data).map_err(io_err),
        ColumnStorage::Text(v) => {
            for s in v {
                let bytes = s.as_bytes();
                w.write_all(&(bytes.len() as u32).to_le_bytes()).map_err(io_err)?;
                w.write_all(bytes).map_err(io_err)?;
            }
            Ok(())
        }
    }
}

fn read_values(r: &mut impl Reader, kind: ColumnKind, row_count: u32) -> Result<ColumnStorage> {
    Ok(match kind {
        ColumnKind::I8 => ColumnStorage::I8(read_i8(r, row_count)?),
        ColumnKind::I16 => ColumnStorage::I16(read_i16(r, row_count)?),
        ColumnKind::I32 => ColumnStorage::I32(read_i32(r, row_count)?),
        ColumnKind::I64 => ColumnStorage::I64(read_i64(r, row_count)?),
        ColumnKind::U8 => ColumnStorage::U8(read_u8(r, row_count)?),
        ColumnKind::U16 => ColumnStorage::U16(read_u16(r, row_count)?),
        ColumnKind::U32 => ColumnStorage::U32(read_u32(r, row_count)?),
        ColumnKind::U64 => ColumnStorage::U64(read_u64(r, row_count)?),
        ColumnKind::F32 => ColumnStorage::F32(read_f32(r, row_count)?),
        ColumnKind::F64 => ColumnStorage::F64(read_f64(r, row_count)?),
        ColumnKind::Category { width } => {
            let mut data = vec![0u8; width as usize * row_count as usize];
            r.read_exact(&mut data).map_err(|e| kind_err(Kind::Decode, format!("truncated category column: {e}")))?;
            ColumnStorage::Category { width, data }
        }
        ColumnKind::Text => {
            let mut v = Vec::with_capacity(row_count as usize);
            for _ in 0..row_count {
                let len = meta_u32(r)? as usize;
                let mut buf = vec![0u8; len];
                r.read_exact(&mut buf).map_err(|e| kind_err(Kind::Decode, format!("truncated text column: {e}")))?;
                v.push(String::from_utf8(buf).map_err(|e| kind_err(Kind::Decode, format!("text value is not valid utf-8: {e}")))?);
            }
            ColumnStorage::Text(v)
        }
    })
}

fn layout_tag(layout: BinLayout) -> u8 {
    match layout {
        BinLayout::Equality => 0,
        BinLayout::Range => 1,
        BinLayout::Interval => 2,
        BinLayout::Fanout => 3,
    }
}

fn layout_from_tag(tag: u8) -> Result<BinLayout> {
    Ok(match tag {
        0 => BinLayout::Equality,
        1 => BinLayout::Range,
        2 => BinLayout::Interval,
        3 => BinLayout::Fanout,
        other => return Err(kind_err(Kind::Decode, format!("unknown index layout tag {other}"))),
    })
}

fn write_index(w: &mut impl Writer, index: &BinnedIndex) -> Result<()> {
    w.write_all(&[layout_tag(index.layout())]).map_err(io_err)?;
    let boundaries = index.bin_boundaries();
    w.write_all(&(boundaries.len() as u32).to_le_bytes()).map_err(io_err)?;
    for &b in boundaries {
        w.write_all(&b.to_le_bytes()).map_err(io_err)?;
    }
    w.write_all(&index.row_count().to_le_bytes()).map_err(io_err)?;
    let bitmaps = index.raw_bitmaps();
    w.write_all(&(bitmaps.len() as u32).to_le_bytes()).map_err(io_err)?;
    for bm in bitmaps {
        bm.encode(w)?;
    }
    Ok(())
}

fn read_index(r: &mut impl Reader) -> Result<BinnedIndex> {
    let mut tag_buf = [0u8; 1];
    r.read_exact(&mut tag_buf).map_err(io_err)?;
    let layout = layout_from_tag(tag_buf[0])?;
    let n_boundaries = read_u32_local(r)?;
    let mut boundaries = Vec::with_capacity(n_boundaries as usize);
    for _ in 0..n_boundaries {
        let mut buf = [0u8; 8];
        r.read_exact(&mut buf).map_err(io_err)?;
        boundaries.push(f64::from_le_bytes(buf));
    }
    let row_count = read_u32_local(r)?;
    let n_bitmaps = read_u32_local(r)?;
    let mut bitmaps = Vec::with_capacity(n_bitmaps as usize);
    for _ in 0..n_bitmaps {
        bitmaps.push(Bitvector::decode(r)?);
    }
    BinnedIndex::from_raw_parts(layout, boundaries, bitmaps, row_count)
}

fn read_u32_local(r: &mut impl Reader) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|e| kind_err(Kind::Decode, format!("truncated index file: {e}")))?;
    Ok(u32::from_le_bytes(buf))
}
