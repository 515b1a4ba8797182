use lodestone_common::RegionKey;

pub const DEFAULT_EXTENSION: &str = "mcr";
const KNOWN_EXTENSIONS: [&str; 2] = ["mcr", "mca"];

/// `r.<rx>.<rz>.mcr`
pub fn region_file_name(key: &RegionKey) -> String {
    format!("r.{}.{}.{}", key.rx, key.rz, DEFAULT_EXTENSION)
}

/// Parses `r.<rx>.<rz>.<mcr|mca>`; anything else is not a region file.
pub fn parse_file_name(name: &str) -> Option<RegionKey> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 || parts[0] != "r" || !KNOWN_EXTENSIONS.contains(&parts[3]) {
        return None;
    }
    Some(RegionKey::new(parse_coord(parts[1])?, parse_coord(parts[2])?))
}

/// Key of a cubic-region container, `r2.<x>.<y>.<z>.<ext>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubicRegionKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

pub fn cubic_region_file_name(key: &CubicRegionKey) -> String {
    format!("r2.{}.{}.{}.{}", key.x, key.y, key.z, DEFAULT_EXTENSION)
}

pub fn parse_cubic_file_name(name: &str) -> Option<CubicRegionKey> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 5 || parts[0] != "r2" || !KNOWN_EXTENSIONS.contains(&parts[4]) {
        return None;
    }
    Some(CubicRegionKey {
        x: parse_coord(parts[1])?,
        y: parse_coord(parts[2])?,
        z: parse_coord(parts[3])?,
    })
}

/// Base-10 signed integer, digits only: `-?[0-9]+`.
fn parse_coord(s: &str) -> Option<i32> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
