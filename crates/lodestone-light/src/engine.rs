use lodestone_common::{BlockKey, LodestoneError, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::info::{BlockInfo, MAX_LUMINANCE};

/// A bounded block volume the light engine can read and relight.
pub trait LitVolume {
    fn xdim(&self) -> usize;
    fn ydim(&self) -> usize;
    fn zdim(&self) -> usize;

    fn get_info(&self, x: usize, y: usize, z: usize) -> &'static BlockInfo;

    fn get_block_light(&self, x: usize, y: usize, z: usize) -> u8;
    fn set_block_light(&mut self, x: usize, y: usize, z: usize, value: u8);

    fn get_sky_light(&self, x: usize, y: usize, z: usize) -> u8;
    fn set_sky_light(&mut self, x: usize, y: usize, z: usize, value: u8);

    fn get_height(&self, x: usize, z: usize) -> usize;
    fn set_height(&mut self, x: usize, z: usize, height: usize);
}

pub type SharedVolume = Rc<RefCell<dyn LitVolume>>;

/// How the engine reaches the eight surrounding volumes: relative
/// (dx, dz) in {-1,0,1}^2, None meaning edge of the loaded world.
pub type NeighborResolver<'a> = dyn FnMut(i32, i32) -> Option<SharedVolume> + 'a;

type LocalMap = [[Option<SharedVolume>; 3]; 3];

struct LightRecord {
    x: i32,
    y: i32,
    z: i32,
    strength: i32,
}

/// Multi-source flood-fill light solver over a 3x3 neighborhood of
/// same-dimension volumes. Holds per-session queue state; not reentrant.
pub struct LightEngine {
    xdim: usize,
    ydim: usize,
    zdim: usize,
    pending: VecDeque<BlockKey>,
    queued: Vec<bool>,
}

impl LightEngine {
    pub fn new(xdim: usize, ydim: usize, zdim: usize) -> Self {
        LightEngine {
            xdim,
            ydim,
            zdim,
            pending: VecDeque::new(),
            queued: vec![false; xdim * 3 * zdim * 3 * ydim],
        }
    }

    /// Incremental block-light repair after the block at the local
    /// coordinate changed.
    pub fn update_block_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<()> {
        self.assert_local(x, y, z);
        let map = self.local_map(center, resolver)?;

        self.pending.push_back(BlockKey::new(x as i32, y as i32, z as i32));
        self.queue_face_neighbors(x as i32, y as i32, z as i32);
        self.drain_block_light(&map);
        Ok(())
    }

    /// Incremental sky-light repair at the local coordinate.
    pub fn update_sky_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<()> {
        self.assert_local(x, y, z);
        let map = self.local_map(center, resolver)?;

        self.pending.push_back(BlockKey::new(x as i32, y as i32, z as i32));
        self.drain_sky_light(&map);
        Ok(())
    }

    /// Incremental height-map maintenance after the block at the local
    /// coordinate changed, cascading a sky-light update at the moved
    /// frontier.
    pub fn update_height_map(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<()> {
        self.assert_local(x, y, z);

        let (obscures, height) = {
            let vol = center.borrow();
            (
                vol.get_info(x, y, z).obscures_light(),
                vol.get_height(x, z),
            )
        };
        let h = (y + 1).min(self.ydim - 1);

        if h < height {
            return Ok(());
        }

        if h == height && !obscures {
            // The previous cap was removed; drop the column to the next
            // obscuring block below, or to the floor.
            {
                let mut vol = center.borrow_mut();
                let mut next = 0;
                for i in (0..y).rev() {
                    if vol.get_info(x, i, z).obscures_light() {
                        next = (i + 1).min(self.ydim - 1);
                        break;
                    }
                }
                vol.set_height(x, z, next);
            }
            self.update_sky_light(center, resolver, x, h, z)?;
        } else if h > height && obscures {
            center.borrow_mut().set_height(x, z, h);
            self.update_sky_light(center, resolver, x, h, z)?;
        }
        Ok(())
    }

    /// Full rebuild: every luminous block floods outward.
    pub fn rebuild_block_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
    ) -> Result<()> {
        let map = self.local_map(center, resolver)?;

        for x in 0..self.xdim {
            for z in 0..self.zdim {
                for y in 0..self.ydim {
                    let luminous = center.borrow().get_info(x, y, z).luminance > 0;
                    if luminous {
                        self.spread_block_light(&map, x as i32, y as i32, z as i32);
                    }
                }
            }
        }
        Ok(())
    }

    /// Full rebuild: flood every column down from the open sky.
    pub fn rebuild_sky_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
    ) -> Result<()> {
        let map = self.local_map(center, resolver)?;
        let heights = self.local_height_map(&map);

        let xdim = self.xdim as i32;
        let zdim = self.zdim as i32;

        for x in 0..self.xdim {
            for z in 0..self.zdim {
                let xi = x as i32 + xdim;
                let zi = z as i32 + zdim;

                // Only queue from the tallest surrounding column; the
                // blocks above it are in full sky.
                let mut h = self.height_at(&heights, xi, zi);
                h = h.max(self.height_at(&heights, xi, zi - 1));
                h = h.max(self.height_at(&heights, xi - 1, zi));
                h = h.max(self.height_at(&heights, xi + 1, zi));
                h = h.max(self.height_at(&heights, xi, zi + 1));

                {
                    let mut vol = center.borrow_mut();
                    for y in (h + 1) as usize..self.ydim {
                        vol.set_sky_light(x, y, z, MAX_LUMINANCE);
                    }
                }

                self.spread_sky_light(&map, &heights, x as i32, h, z as i32);
            }
        }
        Ok(())
    }

    /// Full rebuild of the per-column height map.
    pub fn rebuild_height_map(&mut self, center: &SharedVolume) -> Result<()> {
        self.check_dims(center)?;
        let mut vol = center.borrow_mut();

        for x in 0..self.xdim {
            for z in 0..self.zdim {
                let mut height = 0;
                for y in (0..self.ydim).rev() {
                    if vol.get_info(x, y, z).obscures_light() {
                        height = (y + 1).min(self.ydim - 1);
                        break;
                    }
                }
                vol.set_height(x, z, height);
            }
        }
        Ok(())
    }

    /// Repairs block-light discontinuities along every loaded cardinal
    /// seam, then drains incrementally. A no-op on consistent borders.
    pub fn stitch_block_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
    ) -> Result<()> {
        let map = self.local_map(center, resolver)?;
        let xdim = self.xdim as i32;
        let ydim = self.ydim as i32;
        let zdim = self.zdim as i32;

        if map[1][0].is_some() {
            for x in 0..xdim {
                for y in 0..ydim {
                    self.test_block_light(&map, x, y, 0, x, y, -1);
                }
            }
        }
        if map[0][1].is_some() {
            for z in 0..zdim {
                for y in 0..ydim {
                    self.test_block_light(&map, 0, y, z, -1, y, z);
                }
            }
        }
        if map[1][2].is_some() {
            for x in 0..xdim {
                for y in 0..ydim {
                    self.test_block_light(&map, x, y, zdim - 1, x, y, zdim);
                }
            }
        }
        if map[2][1].is_some() {
            for z in 0..zdim {
                for y in 0..ydim {
                    self.test_block_light(&map, xdim - 1, y, z, xdim, y, z);
                }
            }
        }

        self.drain_block_light(&map);
        Ok(())
    }

    /// Sky-light counterpart of `stitch_block_light`.
    pub fn stitch_sky_light(
        &mut self,
        center: &SharedVolume,
        resolver: &mut NeighborResolver<'_>,
    ) -> Result<()> {
        let map = self.local_map(center, resolver)?;
        let xdim = self.xdim as i32;
        let ydim = self.ydim as i32;
        let zdim = self.zdim as i32;

        if map[1][0].is_some() {
            for x in 0..xdim {
                for y in 0..ydim {
                    self.test_sky_light(&map, x, y, 0, x, y, -1);
                }
            }
        }
        if map[0][1].is_some() {
            for z in 0..zdim {
                for y in 0..ydim {
                    self.test_sky_light(&map, 0, y, z, -1, y, z);
                }
            }
        }
        if map[1][2].is_some() {
            for x in 0..xdim {
                for y in 0..ydim {
                    self.test_sky_light(&map, x, y, zdim - 1, x, y, zdim);
                }
            }
        }
        if map[2][1].is_some() {
            for z in 0..zdim {
                for y in 0..ydim {
                    self.test_sky_light(&map, xdim - 1, y, z, xdim, y, z);
                }
            }
        }

        self.drain_sky_light(&map);
        Ok(())
    }

    /// Count of coordinates waiting in the update queue.
    pub fn pending_updates(&self) -> usize {
        self.pending.len()
    }

    fn drain_block_light(&mut self, map: &LocalMap) {
        let ydim = self.ydim as i32;

        while let Some(key) = self.pending.pop_front() {
            let index = self.bit_index(&key);
            self.queued[index] = false;

            let lle = self.neighbor_block_light(map, key.x, key.y, key.z - 1);
            let lln = self.neighbor_block_light(map, key.x - 1, key.y, key.z);
            let lls = self.neighbor_block_light(map, key.x, key.y, key.z + 1);
            let llw = self.neighbor_block_light(map, key.x + 1, key.y, key.z);
            let lld = self.neighbor_block_light(map, key.x, key.y - 1, key.z);
            let llu = self.neighbor_block_light(map, key.x, key.y + 1, key.z);

            let Some((cc, x, z)) = self.cell(map, key.x, key.z) else {
                continue;
            };
            let y = key.y as usize;

            let (stored, info) = {
                let vol = cc.borrow();
                (vol.get_block_light(x, y, z) as i32, vol.get_info(x, y, z))
            };

            let mut light = info.luminance as i32;
            light = light.max(lle).max(lln).max(lls).max(llw).max(lld).max(llu);
            light = (light - info.opacity as i32).max(0);

            if light != stored {
                cc.borrow_mut().set_block_light(x, y, z, light as u8);

                if info.transmits_light {
                    if key.y > 0 {
                        self.queue_relight(BlockKey::new(key.x, key.y - 1, key.z));
                    }
                    if key.y < ydim - 1 {
                        self.queue_relight(BlockKey::new(key.x, key.y + 1, key.z));
                    }
                    self.queue_relight(BlockKey::new(key.x - 1, key.y, key.z));
                    self.queue_relight(BlockKey::new(key.x + 1, key.y, key.z));
                    self.queue_relight(BlockKey::new(key.x, key.y, key.z - 1));
                    self.queue_relight(BlockKey::new(key.x, key.y, key.z + 1));
                }
            }
        }
    }

    fn drain_sky_light(&mut self, map: &LocalMap) {
        let ydim = self.ydim as i32;

        while let Some(key) = self.pending.pop_front() {
            let index = self.bit_index(&key);
            self.queued[index] = false;

            let Some((cc, x, z)) = self.cell(map, key.x, key.z) else {
                continue;
            };
            let y = key.y as usize;

            let (stored, info, column_height) = {
                let vol = cc.borrow();
                (
                    vol.get_sky_light(x, y, z) as i32,
                    vol.get_info(x, y, z),
                    vol.get_height(x, z),
                )
            };

            let mut light;
            if column_height <= y {
                light = MAX_LUMINANCE as i32;
            } else {
                light = 0;
                light = light.max(self.neighbor_sky_light(map, key.x, key.y, key.z - 1));
                light = light.max(self.neighbor_sky_light(map, key.x - 1, key.y, key.z));
                light = light.max(self.neighbor_sky_light(map, key.x, key.y, key.z + 1));
                light = light.max(self.neighbor_sky_light(map, key.x + 1, key.y, key.z));
                light = light.max(self.neighbor_sky_light(map, key.x, key.y - 1, key.z));
                light = light.max(self.neighbor_sky_light(map, key.x, key.y + 1, key.z));
            }

            light = (light - info.opacity as i32).max(0);

            if light != stored {
                cc.borrow_mut().set_sky_light(x, y, z, light as u8);

                if info.transmits_light {
                    if key.y > 0 {
                        self.queue_relight(BlockKey::new(key.x, key.y - 1, key.z));
                    }
                    if key.y < ydim - 1 {
                        self.queue_relight(BlockKey::new(key.x, key.y + 1, key.z));
                    }
                    self.queue_relight(BlockKey::new(key.x - 1, key.y, key.z));
                    self.queue_relight(BlockKey::new(key.x + 1, key.y, key.z));
                    self.queue_relight(BlockKey::new(key.x, key.y, key.z - 1));
                    self.queue_relight(BlockKey::new(key.x, key.y, key.z + 1));
                }
            }
        }
    }

    /// Explicit outward flood from one luminous block, stopping wherever
    /// the attenuated value no longer improves the stored one.
    fn spread_block_light(&mut self, map: &LocalMap, lx: i32, ly: i32, lz: i32) {
        let center = map[1][1].as_ref().expect("center volume is always present");

        let (primary, primary_light) = {
            let vol = center.borrow();
            (
                vol.get_info(lx as usize, ly as usize, lz as usize),
                vol.get_block_light(lx as usize, ly as usize, lz as usize) as i32,
            )
        };

        let luminance = primary.luminance as i32;
        let primary_lum = (luminance - primary.opacity as i32).max(0);
        if primary_light < primary_lum {
            center
                .borrow_mut()
                .set_block_light(lx as usize, ly as usize, lz as usize, primary_lum as u8);
        }

        if primary_light > luminance - 1 && !primary.transmits_light {
            return;
        }

        let ydim = self.ydim as i32;
        let mut spread: VecDeque<LightRecord> = VecDeque::new();
        let seed = luminance - 1;
        if ly > 0 {
            spread.push_back(LightRecord { x: lx, y: ly - 1, z: lz, strength: seed });
        }
        if ly < ydim - 1 {
            spread.push_back(LightRecord { x: lx, y: ly + 1, z: lz, strength: seed });
        }
        spread.push_back(LightRecord { x: lx - 1, y: ly, z: lz, strength: seed });
        spread.push_back(LightRecord { x: lx + 1, y: ly, z: lz, strength: seed });
        spread.push_back(LightRecord { x: lx, y: ly, z: lz - 1, strength: seed });
        spread.push_back(LightRecord { x: lx, y: ly, z: lz + 1, strength: seed });

        while let Some(rec) = spread.pop_front() {
            let Some((cc, x, z)) = self.cell(map, rec.x, rec.z) else {
                continue;
            };
            let y = rec.y as usize;

            let (info, light) = {
                let vol = cc.borrow();
                (vol.get_info(x, y, z), vol.get_block_light(x, y, z) as i32)
            };

            let dimmed = (rec.strength - info.opacity as i32).max(0);
            if dimmed > light {
                cc.borrow_mut().set_block_light(x, y, z, dimmed as u8);

                if info.transmits_light {
                    let strength = if info.opacity > 0 { dimmed } else { dimmed - 1 };

                    if rec.y > 0 {
                        spread.push_back(LightRecord { x: rec.x, y: rec.y - 1, z: rec.z, strength });
                    }
                    if rec.y < ydim - 1 {
                        spread.push_back(LightRecord { x: rec.x, y: rec.y + 1, z: rec.z, strength });
                    }
                    spread.push_back(LightRecord { x: rec.x - 1, y: rec.y, z: rec.z, strength });
                    spread.push_back(LightRecord { x: rec.x + 1, y: rec.y, z: rec.z, strength });
                    spread.push_back(LightRecord { x: rec.x, y: rec.y, z: rec.z - 1, strength });
                    spread.push_back(LightRecord { x: rec.x, y: rec.y, z: rec.z + 1, strength });
                }
            }
        }
    }

    /// Downward/outward flood from the open-sky frontier of one column.
    /// The stitched height map decides full exposure vs attenuated
    /// spread at every step.
    fn spread_sky_light(&mut self, map: &LocalMap, heights: &[i32], lx: i32, ly: i32, lz: i32) {
        let center = map[1][1].as_ref().expect("center volume is always present");

        let (primary, primary_light) = {
            let vol = center.borrow();
            (
                vol.get_info(lx as usize, ly as usize, lz as usize),
                vol.get_sky_light(lx as usize, ly as usize, lz as usize) as i32,
            )
        };

        let max = MAX_LUMINANCE as i32;
        let primary_lum = (max - primary.opacity as i32).max(0);
        if primary_light < primary_lum {
            center
                .borrow_mut()
                .set_sky_light(lx as usize, ly as usize, lz as usize, primary_lum as u8);
        }

        if primary_light > max - 1 || !primary.transmits_light {
            return;
        }

        let xdim = self.xdim as i32;
        let ydim = self.ydim as i32;
        let zdim = self.zdim as i32;

        let lxi = lx + xdim;
        let lzi = lz + zdim;

        let strength = if primary.opacity > 0 { primary_lum } else { primary_lum - 1 };

        let mut spread: VecDeque<LightRecord> = VecDeque::new();
        if ly > 0 {
            if self.height_at(heights, lxi, lzi) > ly - 1 {
                spread.push_back(LightRecord { x: lx, y: ly - 1, z: lz, strength });
            } else {
                // Still in open sky straight down: no attenuation.
                spread.push_back(LightRecord { x: lx, y: ly - 1, z: lz, strength: primary_lum });
            }
        }
        if ly < ydim - 1 && self.height_at(heights, lxi, lzi) > ly + 1 {
            spread.push_back(LightRecord { x: lx, y: ly + 1, z: lz, strength });
        }
        if self.height_at(heights, lxi - 1, lzi) > ly {
            spread.push_back(LightRecord { x: lx - 1, y: ly, z: lz, strength });
        }
        if self.height_at(heights, lxi + 1, lzi) > ly {
            spread.push_back(LightRecord { x: lx + 1, y: ly, z: lz, strength });
        }
        if self.height_at(heights, lxi, lzi - 1) > ly {
            spread.push_back(LightRecord { x: lx, y: ly, z: lz - 1, strength });
        }
        if self.height_at(heights, lxi, lzi + 1) > ly {
            spread.push_back(LightRecord { x: lx, y: ly, z: lz + 1, strength });
        }

        while let Some(rec) = spread.pop_front() {
            let Some((cc, x, z)) = self.cell(map, rec.x, rec.z) else {
                continue;
            };
            let y = rec.y as usize;

            let (info, light) = {
                let vol = cc.borrow();
                (vol.get_info(x, y, z), vol.get_sky_light(x, y, z) as i32)
            };

            let dimmed = (rec.strength - info.opacity as i32).max(0);
            if dimmed > light {
                cc.borrow_mut().set_sky_light(x, y, z, dimmed as u8);

                if info.transmits_light {
                    let strength = if info.opacity > 0 { dimmed } else { dimmed - 1 };
                    let xi = rec.x + xdim;
                    let zi = rec.z + zdim;

                    if rec.y > 0 {
                        if self.height_at(heights, xi, zi) > rec.y - 1 {
                            spread.push_back(LightRecord { x: rec.x, y: rec.y - 1, z: rec.z, strength });
                        } else {
                            spread.push_back(LightRecord { x: rec.x, y: rec.y - 1, z: rec.z, strength: dimmed });
                        }
                    }
                    if rec.y < ydim - 1 && self.height_at(heights, xi, zi) > rec.y + 1 {
                        spread.push_back(LightRecord { x: rec.x, y: rec.y + 1, z: rec.z, strength });
                    }
                    if self.height_at(heights, xi - 1, zi) > rec.y {
                        spread.push_back(LightRecord { x: rec.x - 1, y: rec.y, z: rec.z, strength });
                    }
                    if self.height_at(heights, xi + 1, zi) > rec.y {
                        spread.push_back(LightRecord { x: rec.x + 1, y: rec.y, z: rec.z, strength });
                    }
                    if self.height_at(heights, xi, zi - 1) > rec.y {
                        spread.push_back(LightRecord { x: rec.x, y: rec.y, z: rec.z - 1, strength });
                    }
                    if self.height_at(heights, xi, zi + 1) > rec.y {
                        spread.push_back(LightRecord { x: rec.x, y: rec.y, z: rec.z + 1, strength });
                    }
                }
            }
        }
    }

    /// Effective block light a neighbor contributes: opaque blocks shine
    /// their luminance, transmitting ones their attenuated stored light.
    fn neighbor_block_light(&self, map: &LocalMap, x: i32, y: i32, z: i32) -> i32 {
        if y < 0 || y >= self.ydim as i32 {
            return 0;
        }
        let Some((cc, lx, lz)) = self.cell(map, x, z) else {
            return 0;
        };
        let vol = cc.borrow();
        let info = vol.get_info(lx, y as usize, lz);
        if !info.transmits_light {
            return info.luminance as i32;
        }

        let light = vol.get_block_light(lx, y as usize, lz) as i32;
        let passed = if info.opacity > 0 { light } else { light - 1 };
        passed.max(info.luminance as i32 - 1)
    }

    fn neighbor_sky_light(&self, map: &LocalMap, x: i32, y: i32, z: i32) -> i32 {
        if y < 0 || y >= self.ydim as i32 {
            return 0;
        }
        let Some((cc, lx, lz)) = self.cell(map, x, z) else {
            return 0;
        };
        let vol = cc.borrow();
        let info = vol.get_info(lx, y as usize, lz);
        if !info.transmits_light {
            return 0;
        }

        let light = vol.get_sky_light(lx, y as usize, lz) as i32;
        if info.opacity > 0 {
            light
        } else {
            light - 1
        }
    }

    fn test_block_light(&mut self, map: &LocalMap, lx: i32, ly: i32, lz: i32, nx: i32, ny: i32, nz: i32) {
        let (local_light, local_lum) = {
            let center = map[1][1].as_ref().unwrap().borrow();
            (
                center.get_block_light(lx as usize, ly as usize, lz as usize) as i32,
                center.get_info(lx as usize, ly as usize, lz as usize).luminance as i32,
            )
        };
        let Some((cc, ax, az)) = self.cell(map, nx, nz) else {
            return;
        };
        let (neighbor_light, neighbor_lum) = {
            let vol = cc.borrow();
            (
                vol.get_block_light(ax, ny as usize, az) as i32,
                vol.get_info(ax, ny as usize, az).luminance as i32,
            )
        };

        let v1 = local_light.max(local_lum);
        let v2 = neighbor_light.max(neighbor_lum);
        if (v1 - v2).abs() > 1 {
            self.queue_relight(BlockKey::new(lx, ly, lz));
        }
    }

    fn test_sky_light(&mut self, map: &LocalMap, lx: i32, ly: i32, lz: i32, nx: i32, ny: i32, nz: i32) {
        let local_light = map[1][1]
            .as_ref()
            .unwrap()
            .borrow()
            .get_sky_light(lx as usize, ly as usize, lz as usize) as i32;
        let Some((cc, ax, az)) = self.cell(map, nx, nz) else {
            return;
        };
        let neighbor_light = cc.borrow().get_sky_light(ax, ny as usize, az) as i32;

        if (local_light - neighbor_light).abs() > 1 {
            self.queue_relight(BlockKey::new(lx, ly, lz));
        }
    }

    fn queue_face_neighbors(&mut self, x: i32, y: i32, z: i32) {
        if y > 0 {
            self.queue_relight(BlockKey::new(x, y - 1, z));
        }
        if y < self.ydim as i32 - 1 {
            self.queue_relight(BlockKey::new(x, y + 1, z));
        }
        self.queue_relight(BlockKey::new(x - 1, y, z));
        self.queue_relight(BlockKey::new(x + 1, y, z));
        self.queue_relight(BlockKey::new(x, y, z - 1));
        self.queue_relight(BlockKey::new(x, y, z + 1));
    }

    /// Enqueue at most once per coordinate per drain; the bitset spans
    /// the whole 3x3 neighborhood.
    fn queue_relight(&mut self, key: BlockKey) {
        let xdim = self.xdim as i32;
        let zdim = self.zdim as i32;
        if key.x < -(xdim - 1) || key.x >= 2 * xdim - 1 || key.z < -(zdim - 1) || key.z >= 2 * zdim - 1 {
            return;
        }

        let index = self.bit_index(&key);
        if !self.queued[index] {
            self.queued[index] = true;
            self.pending.push_back(key);
        }
    }

    fn bit_index(&self, key: &BlockKey) -> usize {
        let x = (key.x + self.xdim as i32) as usize;
        let y = key.y as usize;
        let z = (key.z + self.zdim as i32) as usize;

        let zstride = self.ydim;
        let xstride = self.zdim * 3 * zstride;

        x * xstride + z * zstride + y
    }

    /// The volume holding a relative coordinate, with the coordinate
    /// rebased into it. None past the edge of the loaded neighborhood.
    fn cell<'m>(&self, map: &'m LocalMap, x: i32, z: i32) -> Option<(&'m SharedVolume, usize, usize)> {
        let xi = x + self.xdim as i32;
        let zi = z + self.zdim as i32;
        if xi < 0 || zi < 0 || xi >= 3 * self.xdim as i32 || zi >= 3 * self.zdim as i32 {
            return None;
        }
        let (xi, zi) = (xi as usize, zi as usize);
        let cc = map[xi / self.xdim][zi / self.zdim].as_ref()?;
        Some((cc, xi % self.xdim, zi % self.zdim))
    }

    fn local_map(&self, center: &SharedVolume, resolver: &mut NeighborResolver<'_>) -> Result<LocalMap> {
        self.check_dims(center)?;

        let mut map: LocalMap = Default::default();
        for dx in -1..=1i32 {
            for dz in -1..=1i32 {
                if dx == 0 && dz == 0 {
                    map[1][1] = Some(center.clone());
                    continue;
                }
                if let Some(neighbor) = resolver(dx, dz) {
                    self.check_dims(&neighbor)?;
                    map[(dx + 1) as usize][(dz + 1) as usize] = Some(neighbor);
                }
            }
        }
        Ok(map)
    }

    fn local_height_map(&self, map: &LocalMap) -> Vec<i32> {
        let mut heights = vec![0i32; self.xdim * 3 * self.zdim * 3];
        for (xi, row) in map.iter().enumerate() {
            for (zi, cell) in row.iter().enumerate() {
                let Some(cc) = cell else {
                    continue;
                };
                let vol = cc.borrow();
                for x in 0..self.xdim {
                    for z in 0..self.zdim {
                        let xx = xi * self.xdim + x;
                        let zz = zi * self.zdim + z;
                        heights[xx * self.zdim * 3 + zz] = vol.get_height(x, z) as i32;
                    }
                }
            }
        }
        heights
    }

    /// `xi`/`zi` are offset coordinates in [0, 3*dim).
    fn height_at(&self, heights: &[i32], xi: i32, zi: i32) -> i32 {
        heights[xi as usize * self.zdim * 3 + zi as usize]
    }

    fn check_dims(&self, volume: &SharedVolume) -> Result<()> {
        let vol = volume.borrow();
        let actual = (vol.xdim(), vol.ydim(), vol.zdim());
        let expected = (self.xdim, self.ydim, self.zdim);
        if actual != expected {
            return Err(LodestoneError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    fn assert_local(&self, x: usize, y: usize, z: usize) {
        assert!(
            x < self.xdim && y < self.ydim && z < self.zdim,
            "local coordinate ({}, {}, {}) outside {}x{}x{} volume",
            x,
            y,
            z,
            self.xdim,
            self.ydim,
            self.zdim
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::block_info;
    use assert_matches::assert_matches;

    const DIM: usize = 16;

    const AIR: u16 = 0;
    const STONE: u16 = 1;
    const TORCH: u16 = 50;
    const GLOWSTONE: u16 = 89;

    #[derive(Clone)]
    struct GridVolume {
        xdim: usize,
        ydim: usize,
        zdim: usize,
        ids: Vec<u16>,
        block_light: Vec<u8>,
        sky_light: Vec<u8>,
        heights: Vec<usize>,
    }

    impl GridVolume {
        fn new(xdim: usize, ydim: usize, zdim: usize) -> Self {
            GridVolume {
                xdim,
                ydim,
                zdim,
                ids: vec![AIR; xdim * ydim * zdim],
                block_light: vec![0; xdim * ydim * zdim],
                sky_light: vec![0; xdim * ydim * zdim],
                heights: vec![0; xdim * zdim],
            }
        }

        fn idx(&self, x: usize, y: usize, z: usize) -> usize {
            (x * self.zdim + z) * self.ydim + y
        }

        fn set_id(&mut self, x: usize, y: usize, z: usize, id: u16) {
            let i = self.idx(x, y, z);
            self.ids[i] = id;
        }
    }

    impl LitVolume for GridVolume {
        fn xdim(&self) -> usize {
            self.xdim
        }
        fn ydim(&self) -> usize {
            self.ydim
        }
        fn zdim(&self) -> usize {
            self.zdim
        }
        fn get_info(&self, x: usize, y: usize, z: usize) -> &'static BlockInfo {
            block_info(self.ids[self.idx(x, y, z)])
        }
        fn get_block_light(&self, x: usize, y: usize, z: usize) -> u8 {
            self.block_light[self.idx(x, y, z)]
        }
        fn set_block_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
            let i = self.idx(x, y, z);
            self.block_light[i] = value;
        }
        fn get_sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
            self.sky_light[self.idx(x, y, z)]
        }
        fn set_sky_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
            let i = self.idx(x, y, z);
            self.sky_light[i] = value;
        }
        fn get_height(&self, x: usize, z: usize) -> usize {
            self.heights[x * self.zdim + z]
        }
        fn set_height(&mut self, x: usize, z: usize, height: usize) {
            self.heights[x * self.zdim + z] = height;
        }
    }

    fn shared(volume: GridVolume) -> Rc<RefCell<GridVolume>> {
        Rc::new(RefCell::new(volume))
    }

    fn as_volume(rc: &Rc<RefCell<GridVolume>>) -> SharedVolume {
        rc.clone()
    }

    fn no_neighbors(_dx: i32, _dz: i32) -> Option<SharedVolume> {
        None
    }

    #[test]
    fn test_rebuild_block_light_from_glowstone() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        grid.borrow_mut().set_id(8, 8, 8, GLOWSTONE);
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine
            .rebuild_block_light(&center, &mut no_neighbors)
            .unwrap();

        let vol = grid.borrow();
        // Transmitting blocks adjacent to a max-luminance source sit one
        // attenuation step below it.
        assert_eq!(vol.get_block_light(9, 8, 8), MAX_LUMINANCE - 1);
        assert_eq!(vol.get_block_light(7, 8, 8), MAX_LUMINANCE - 1);
        assert_eq!(vol.get_block_light(8, 9, 8), MAX_LUMINANCE - 1);
        // One more step, one more attenuation.
        assert_eq!(vol.get_block_light(10, 8, 8), MAX_LUMINANCE - 2);
        // Manhattan distance drops the level linearly through air.
        assert_eq!(vol.get_block_light(11, 10, 8), MAX_LUMINANCE - 5);
    }

    #[test]
    fn test_rebuild_block_light_monotonicity() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        {
            let mut vol = grid.borrow_mut();
            vol.set_id(4, 4, 4, GLOWSTONE);
            vol.set_id(12, 6, 12, TORCH);
            vol.set_id(8, 4, 4, STONE);
        }
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine
            .rebuild_block_light(&center, &mut no_neighbors)
            .unwrap();

        let vol = grid.borrow();
        for x in 0..DIM {
            for y in 0..DIM {
                for z in 0..DIM {
                    let light = vol.get_block_light(x, y, z) as i32;
                    let info = vol.get_info(x, y, z);

                    let mut bound = info.luminance as i32;
                    let mut probe = |nx: i32, ny: i32, nz: i32| {
                        if nx >= 0
                            && ny >= 0
                            && nz >= 0
                            && (nx as usize) < DIM
                            && (ny as usize) < DIM
                            && (nz as usize) < DIM
                        {
                            let neighbor =
                                vol.get_block_light(nx as usize, ny as usize, nz as usize);
                            bound = bound.max(neighbor as i32);
                        }
                    };
                    probe(x as i32 - 1, y as i32, z as i32);
                    probe(x as i32 + 1, y as i32, z as i32);
                    probe(x as i32, y as i32 - 1, z as i32);
                    probe(x as i32, y as i32 + 1, z as i32);
                    probe(x as i32, y as i32, z as i32 - 1);
                    probe(x as i32, y as i32, z as i32 + 1);

                    assert!(
                        light <= bound,
                        "({}, {}, {}) reads {} above bound {}",
                        x,
                        y,
                        z,
                        light,
                        bound
                    );
                }
            }
        }
    }

    #[test]
    fn test_update_block_light_clears_removed_source() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        grid.borrow_mut().set_id(8, 8, 8, TORCH);
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine
            .rebuild_block_light(&center, &mut no_neighbors)
            .unwrap();
        assert_eq!(grid.borrow().get_block_light(8, 8, 8), 14);

        grid.borrow_mut().set_id(8, 8, 8, AIR);
        engine
            .update_block_light(&center, &mut no_neighbors, 8, 8, 8)
            .unwrap();

        let vol = grid.borrow();
        for x in 0..DIM {
            for y in 0..DIM {
                for z in 0..DIM {
                    assert_eq!(vol.get_block_light(x, y, z), 0);
                }
            }
        }
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let center = as_volume(&shared(GridVolume::new(DIM, DIM, DIM)));
        let runt = shared(GridVolume::new(8, DIM, DIM));

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        let mut resolver = move |_dx: i32, _dz: i32| Some(as_volume(&runt));
        let result = engine.rebuild_block_light(&center, &mut resolver);
        assert_matches!(result, Err(LodestoneError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_rebuild_height_map() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        grid.borrow_mut().set_id(3, 10, 3, STONE);
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine.rebuild_height_map(&center).unwrap();

        let vol = grid.borrow();
        assert_eq!(vol.get_height(3, 3), 11);
        assert_eq!(vol.get_height(0, 0), 0);
    }

    #[test]
    fn test_rebuild_sky_light_under_roof() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        {
            let mut vol = grid.borrow_mut();
            for x in 0..DIM {
                for z in 0..DIM {
                    vol.set_id(x, 8, z, STONE);
                }
            }
        }
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine.rebuild_height_map(&center).unwrap();
        engine
            .rebuild_sky_light(&center, &mut no_neighbors)
            .unwrap();

        let vol = grid.borrow();
        assert_eq!(vol.get_height(8, 8), 9);
        assert_eq!(vol.get_sky_light(8, 12, 8), MAX_LUMINANCE);
        assert_eq!(vol.get_sky_light(8, 9, 8), MAX_LUMINANCE);
        // The roof blocks the whole column below it.
        assert_eq!(vol.get_sky_light(8, 5, 8), 0);
    }

    #[test]
    fn test_open_sky_column_is_fully_lit() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine.rebuild_height_map(&center).unwrap();
        engine
            .rebuild_sky_light(&center, &mut no_neighbors)
            .unwrap();

        let vol = grid.borrow();
        for y in 0..DIM {
            assert_eq!(vol.get_sky_light(5, y, 5), MAX_LUMINANCE);
        }
    }

    #[test]
    fn test_update_height_map_tracks_new_cap() {
        let grid = shared(GridVolume::new(DIM, DIM, DIM));
        let center = as_volume(&grid);

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine.rebuild_height_map(&center).unwrap();
        engine
            .rebuild_sky_light(&center, &mut no_neighbors)
            .unwrap();
        assert_eq!(grid.borrow().get_height(5, 5), 0);

        grid.borrow_mut().set_id(5, 10, 5, STONE);
        engine
            .update_height_map(&center, &mut no_neighbors, 5, 10, 5)
            .unwrap();
        assert_eq!(grid.borrow().get_height(5, 5), 11);

        grid.borrow_mut().set_id(5, 10, 5, AIR);
        engine
            .update_height_map(&center, &mut no_neighbors, 5, 10, 5)
            .unwrap();
        assert_eq!(grid.borrow().get_height(5, 5), 0);
    }

    #[test]
    fn test_stitch_block_light_repairs_seam_and_is_idempotent() {
        let lit = shared(GridVolume::new(DIM, DIM, DIM));
        lit.borrow_mut().set_id(DIM - 1, 8, 8, GLOWSTONE);
        let dark = shared(GridVolume::new(DIM, DIM, DIM));

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine
            .rebuild_block_light(&as_volume(&lit), &mut no_neighbors)
            .unwrap();

        let lit_for_resolver = lit.clone();
        let mut resolver = move |dx: i32, dz: i32| {
            if dx == -1 && dz == 0 {
                Some(as_volume(&lit_for_resolver))
            } else {
                None
            }
        };

        let center = as_volume(&dark);
        engine.stitch_block_light(&center, &mut resolver).unwrap();

        // Light crossed the seam into the dark volume.
        assert!(dark.borrow().get_block_light(0, 8, 8) > 0);
        assert!(dark.borrow().get_block_light(1, 8, 8) > 0);

        // A second stitch over now-consistent borders changes nothing.
        let dark_snapshot = dark.borrow().block_light.clone();
        let lit_snapshot = lit.borrow().block_light.clone();
        engine.stitch_block_light(&center, &mut resolver).unwrap();
        assert_eq!(dark.borrow().block_light, dark_snapshot);
        assert_eq!(lit.borrow().block_light, lit_snapshot);
    }

    #[test]
    fn test_stitch_sky_light_idempotent_on_consistent_borders() {
        let a = shared(GridVolume::new(DIM, DIM, DIM));
        let b = shared(GridVolume::new(DIM, DIM, DIM));

        let mut engine = LightEngine::new(DIM, DIM, DIM);
        engine.rebuild_height_map(&as_volume(&a)).unwrap();
        engine.rebuild_height_map(&as_volume(&b)).unwrap();
        engine
            .rebuild_sky_light(&as_volume(&a), &mut no_neighbors)
            .unwrap();
        engine
            .rebuild_sky_light(&as_volume(&b), &mut no_neighbors)
            .unwrap();

        let b_for_resolver = b.clone();
        let mut resolver = move |dx: i32, dz: i32| {
            if dx == 1 && dz == 0 {
                Some(as_volume(&b_for_resolver))
            } else {
                None
            }
        };

        let center = as_volume(&a);
        let snapshot = a.borrow().sky_light.clone();
        engine.stitch_sky_light(&center, &mut resolver).unwrap();
        assert_eq!(a.borrow().sky_light, snapshot);
    }
}

