use lodestone_common::Result;
use lodestone_nbt::Tree;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One compressed tree per file. Reads auto-detect gzip and fall back to
/// the raw codec; writes always gzip.
pub struct TreeFile {
    path: PathBuf,
}

impl TreeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TreeFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    pub fn read(&self) -> Result<Tree> {
        let mut file = File::open(&self.path)?;
        Tree::read_auto(&mut file)
    }

    pub fn write(&self, tree: &Tree) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&self.path)?;
        tree.write_gzip(&mut file)
    }
}

/// Loose chunk storage path: two base36 fanout directories, then
/// `c.<x36>.<z36>.dat`.
pub fn chunk_file_path(base: &Path, cx: i32, cz: i32) -> PathBuf {
    base.join(base36(cx.rem_euclid(64) as i64))
        .join(base36(cz.rem_euclid(64) as i64))
        .join(format!("c.{}.{}.dat", base36(cx as i64), base36(cz as i64)))
}

/// Parses `c.<x36>.<z36>.dat` back into chunk coordinates.
pub fn parse_chunk_file_name(name: &str) -> Option<(i32, i32)> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 || parts[0] != "c" || parts[3] != "dat" {
        return None;
    }
    Some((parse_base36(parts[1])?, parse_base36(parts[2])?))
}

fn parse_base36(s: &str) -> Option<i32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    let value = i64::from_str_radix(digits, 36).ok()?;
    let signed = if s.starts_with('-') { -value } else { value };
    i32::try_from(signed).ok()
}

fn base36(value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let negative = value < 0;
    let mut v = value.unsigned_abs();
    let mut out = Vec::new();
    while v > 0 {
        out.push(DIGITS[(v % 36) as usize]);
        v /= 36;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}
