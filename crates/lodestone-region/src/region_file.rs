use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lodestone_common::{LodestoneError, Result};
use lodestone_logger::unix_timestamp;
use lodestone_nbt::Tree;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const SECTOR_BYTES: usize = 4096;
const SECTOR_INTS: usize = SECTOR_BYTES / 4;
const ENTRY_HEADER_SIZE: usize = 5;

pub const COMPRESSION_GZIP: u8 = 1;
pub const COMPRESSION_ZLIB: u8 = 2;

const EMPTY_SECTOR: [u8; SECTOR_BYTES] = [0; SECTOR_BYTES];

/// A paginated container holding up to 1024 independently compressed
/// trees. Sectors 0-1 are the directory (offset/count pairs) and the
/// timestamp table; everything after is entry space managed by a
/// first-fit free-run allocator.
pub struct RegionFile {
    path: PathBuf,
    file: File,
    offsets: Vec<u32>,
    timestamps: Vec<u32>,
    sector_free: Vec<bool>,
}

impl RegionFile {
    /// Opens a region file, creating and formatting it when absent or
    /// shorter than the two header sectors.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut length = file.metadata()?.len();

        if length < (SECTOR_BYTES * 2) as u64 {
            // Fresh (or unusably short) file: write the directory and
            // timestamp sectors.
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&EMPTY_SECTOR)?;
            file.write_all(&EMPTY_SECTOR)?;
            length = (SECTOR_BYTES * 2) as u64;
        }

        if length % SECTOR_BYTES as u64 != 0 {
            // Grow a misaligned file to the next sector boundary.
            let pad = SECTOR_BYTES as u64 - length % SECTOR_BYTES as u64;
            file.seek(SeekFrom::End(0))?;
            file.write_all(&EMPTY_SECTOR[..pad as usize])?;
            length += pad;
        }

        let sector_count = (length / SECTOR_BYTES as u64) as usize;
        let mut sector_free = vec![true; sector_count];
        sector_free[0] = false; // directory
        sector_free[1] = false; // timestamps

        file.seek(SeekFrom::Start(0))?;
        let mut offsets = Vec::with_capacity(SECTOR_INTS);
        for _ in 0..SECTOR_INTS {
            let offset = file.read_u32::<BigEndian>()?;
            offsets.push(offset);

            let sector = (offset >> 8) as usize;
            let count = (offset & 0xFF) as usize;
            if offset != 0 && sector + count <= sector_free.len() {
                for i in 0..count {
                    sector_free[sector + i] = false;
                }
            }
        }
        let mut timestamps = Vec::with_capacity(SECTOR_INTS);
        for _ in 0..SECTOR_INTS {
            timestamps.push(file.read_u32::<BigEndian>()?);
        }

        Ok(RegionFile {
            path,
            file,
            offsets,
            timestamps,
            sector_free,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_chunk(&self, x: usize, z: usize) -> bool {
        x < 32 && z < 32 && self.offsets[slot(x, z)] != 0
    }

    pub fn get_timestamp(&self, x: usize, z: usize) -> u32 {
        self.timestamps[slot(x, z)]
    }

    /// A decompressing reader over the entry at (x, z), or None when the
    /// slot is empty. A malformed entry is an error scoped to this slot.
    pub fn chunk_data_reader(&mut self, x: usize, z: usize) -> Result<Option<Box<dyn Read>>> {
        let Some((compression, data)) = self.read_entry_raw(x, z)? else {
            return Ok(None);
        };

        match compression {
            COMPRESSION_GZIP => Ok(Some(Box::new(GzDecoder::new(Cursor::new(data))))),
            COMPRESSION_ZLIB => Ok(Some(Box::new(ZlibDecoder::new(Cursor::new(data))))),
            other => Err(LodestoneError::InvalidChunk(format!(
                "unknown compression type {} at ({}, {})",
                other, x, z
            ))),
        }
    }

    /// An in-memory compressing writer for the entry at (x, z). Nothing
    /// touches the file until `finish`.
    pub fn chunk_data_writer(&mut self, x: usize, z: usize) -> Result<ChunkDataWriter<'_>> {
        check_bounds(x, z)?;
        Ok(ChunkDataWriter {
            region: self,
            x,
            z,
            encoder: ZlibEncoder::new(Vec::with_capacity(8096), Compression::default()),
        })
    }

    pub fn read_chunk(&mut self, x: usize, z: usize) -> Result<Option<Tree>> {
        match self.chunk_data_reader(x, z)? {
            Some(mut reader) => Ok(Some(Tree::read(&mut reader)?)),
            None => Ok(None),
        }
    }

    pub fn write_chunk(&mut self, x: usize, z: usize, tree: &Tree) -> Result<()> {
        let mut writer = self.chunk_data_writer(x, z)?;
        tree.write(&mut writer)?;
        writer.finish()
    }

    /// Frees the slot's sectors back to the allocator and zeroes the
    /// directory and timestamp entries. The file is never shrunk.
    pub fn delete_chunk(&mut self, x: usize, z: usize) -> Result<()> {
        check_bounds(x, z)?;
        let offset = self.offsets[slot(x, z)];
        if offset == 0 {
            return Ok(());
        }
        let sector = (offset >> 8) as usize;
        let count = (offset & 0xFF) as usize;

        self.file
            .seek(SeekFrom::Start((sector * SECTOR_BYTES) as u64))?;
        for i in 0..count {
            self.file.write_all(&EMPTY_SECTOR)?;
            self.sector_free[sector + i] = true;
        }

        self.set_offset(x, z, 0)?;
        self.set_timestamp(x, z, 0)?;
        Ok(())
    }

    pub fn set_timestamp(&mut self, x: usize, z: usize, value: u32) -> Result<()> {
        self.timestamps[slot(x, z)] = value;
        self.file
            .seek(SeekFrom::Start((SECTOR_BYTES + slot(x, z) * 4) as u64))?;
        self.file.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    fn read_entry_raw(&mut self, x: usize, z: usize) -> Result<Option<(u8, Vec<u8>)>> {
        check_bounds(x, z)?;
        let offset = self.offsets[slot(x, z)];
        if offset == 0 {
            return Ok(None);
        }

        let sector = (offset >> 8) as usize;
        let count = (offset & 0xFF) as usize;
        if sector + count > self.sector_free.len() {
            return Err(LodestoneError::InvalidChunk(format!(
                "entry at ({}, {}) points past the end of the file",
                x, z
            )));
        }

        self.file
            .seek(SeekFrom::Start((sector * SECTOR_BYTES) as u64))?;
        let length = self.file.read_u32::<BigEndian>()? as usize;
        if length < 1 || length > SECTOR_BYTES * count {
            return Err(LodestoneError::InvalidChunk(format!(
                "entry at ({}, {}) has invalid length {} for {} sectors",
                x, z, length, count
            )));
        }

        let compression = self.file.read_u8()?;
        let mut data = vec![0u8; length - 1];
        self.file.read_exact(&mut data)?;
        Ok(Some((compression, data)))
    }

    /// Places a finished compressed entry. Sector allocation: reuse the
    /// current run when the size matches, else first-fit over free runs,
    /// else extend the file. The directory and timestamp entries are
    /// rewritten only after the payload write succeeds.
    fn write_entry(&mut self, x: usize, z: usize, data: &[u8]) -> Result<()> {
        let offset = self.offsets[slot(x, z)];
        let current_sector = (offset >> 8) as usize;
        let allocated = (offset & 0xFF) as usize;
        let needed = (data.len() + ENTRY_HEADER_SIZE) / SECTOR_BYTES + 1;

        if needed >= 256 {
            return Err(LodestoneError::RegionError(format!(
                "entry at ({}, {}) needs {} sectors; the directory caps entries at 255",
                x, z, needed
            )));
        }

        if current_sector != 0 && allocated == needed {
            // Same footprint: overwrite in place.
            self.write_at_sector(current_sector, needed, data)?;
            self.set_timestamp(x, z, unix_timestamp() as u32)?;
            return Ok(());
        }

        for i in 0..allocated {
            self.sector_free[current_sector + i] = true;
        }

        let sector = match self.find_free_run(needed) {
            Some(start) => start,
            None => {
                // No run fits: append fresh sectors at the end.
                let start = self.sector_free.len();
                self.file.seek(SeekFrom::End(0))?;
                for _ in 0..needed {
                    self.file.write_all(&EMPTY_SECTOR)?;
                    self.sector_free.push(true);
                }
                start
            }
        };

        self.write_at_sector(sector, needed, data)?;
        for i in 0..needed {
            self.sector_free[sector + i] = false;
        }
        self.set_offset(x, z, ((sector as u32) << 8) | needed as u32)?;
        self.set_timestamp(x, z, unix_timestamp() as u32)?;
        Ok(())
    }

    /// First free run of at least `needed` sectors; adjacent free sectors
    /// coalesce by construction of the scan.
    fn find_free_run(&self, needed: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_length = 0;
        for (i, free) in self.sector_free.iter().enumerate() {
            if *free {
                if run_length == 0 {
                    run_start = i;
                }
                run_length += 1;
                if run_length >= needed {
                    return Some(run_start);
                }
            } else {
                run_length = 0;
            }
        }
        None
    }

    fn write_at_sector(&mut self, sector: usize, sector_span: usize, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start((sector * SECTOR_BYTES) as u64))?;
        self.file.write_u32::<BigEndian>(data.len() as u32 + 1)?;
        self.file.write_u8(COMPRESSION_ZLIB)?;
        self.file.write_all(data)?;

        let written = ENTRY_HEADER_SIZE + data.len();
        let mut pad = sector_span * SECTOR_BYTES - written;
        while pad > 0 {
            let step = pad.min(SECTOR_BYTES);
            self.file.write_all(&EMPTY_SECTOR[..step])?;
            pad -= step;
        }
        Ok(())
    }

    fn set_offset(&mut self, x: usize, z: usize, offset: u32) -> Result<()> {
        self.offsets[slot(x, z)] = offset;
        self.file.seek(SeekFrom::Start((slot(x, z) * 4) as u64))?;
        self.file.write_u32::<BigEndian>(offset)?;
        Ok(())
    }
}

fn slot(x: usize, z: usize) -> usize {
    x + z * 32
}

fn check_bounds(x: usize, z: usize) -> Result<()> {
    if x >= 32 || z >= 32 {
        return Err(LodestoneError::RegionError(format!(
            "chunk coordinate ({}, {}) outside the 32x32 directory",
            x, z
        )));
    }
    Ok(())
}

/// Buffers and compresses an entry in memory; `finish` runs the sector
/// allocation and writes it out.
pub struct ChunkDataWriter<'a> {
    region: &'a mut RegionFile,
    x: usize,
    z: usize,
    encoder: ZlibEncoder<Vec<u8>>,
}

impl ChunkDataWriter<'_> {
    pub fn finish(self) -> Result<()> {
        let data = self.encoder.finish()?;
        self.region.write_entry(self.x, self.z, &data)
    }
}

impl Write for ChunkDataWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder.flush()
    }
}
