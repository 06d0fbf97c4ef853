use strata_blocks::{Block, MaterialRegistry};
use strata_chunk::{Chunk, ChunkError, HEIGHT_UNKNOWN, LightBuffers, LightChannel, LightOp};
use strata_world::{CHUNK_SIZE, ChunkCoord, local_index};

const S: usize = CHUNK_SIZE;

#[inline]
fn is_edge(lx: usize, lz: usize) -> bool {
    lx == 0 || lz == 0 || lx == S - 1 || lz == S - 1
}

/// Resets a chunk's light and queues the work to rebuild it: emitters and
/// sky-exposed cells are written directly, and cells whose value depends
/// on neighboring chunks are queued for refresh.
pub fn init_chunk_lighting(chunk: &Chunk) -> Result<(), ChunkError> {
    chunk.reset_light()?;
    let reg = &chunk.context().registry;
    let column = chunk.column();
    let (_, by, _) = chunk.coord().base();
    let top = by + S as i32 - 1;
    for lz in 0..S {
        for lx in 0..S {
            let h = column.surface_height(lx, lz);
            let column_y = if h == HEIGHT_UNKNOWN { i32::MIN } else { h + 1 };
            let edge = is_edge(lx, lz);
            for ly in 0..S {
                let y = by + ly as i32;
                let id = chunk.block_local(lx, ly, lz)?.id;
                let emission = reg.light_level(id);
                if emission > 0 {
                    chunk.add_light_update(LightChannel::Block, lx, ly, lz, emission)?;
                }
                if y >= column_y {
                    if !reg.occludes(id) {
                        chunk.add_light_update(LightChannel::Sky, lx, ly, lz, 15)?;
                    }
                } else if edge {
                    chunk.add_light_op(LightChannel::Sky, lx, ly, lz, LightOp::Refresh)?;
                }
                if edge || ly == 0 || ly == S - 1 {
                    chunk.add_light_op(LightChannel::Block, lx, ly, lz, LightOp::Refresh)?;
                }
            }
            if !edge {
                chunk.add_light_op(LightChannel::Sky, lx, 0, lz, LightOp::Refresh)?;
                if column_y > top {
                    chunk.add_light_op(LightChannel::Sky, lx, S - 1, lz, LightOp::Refresh)?;
                }
            }
        }
    }
    Ok(())
}

/// Initial light for a freshly generated chunk: sky 15 above the surface,
/// 0 below, block light at each emitter's level. `heights` is indexed
/// `z * 16 + x`.
pub fn prefill_light(coord: ChunkCoord, blocks: &[Block], heights: &[i32], reg: &MaterialRegistry) -> LightBuffers {
    let light = LightBuffers::dark();
    let (_, by, _) = coord.base();
    for ly in 0..S {
        let y = by + ly as i32;
        for lz in 0..S {
            for lx in 0..S {
                let i = local_index(lx, ly, lz);
                let id = blocks[i].id;
                let emission = reg.light_level(id);
                if emission > 0 {
                    light.block.set(i, emission);
                }
                if y > heights[lz * S + lx] && !reg.occludes(id) {
                    light.sky.set(i, 15);
                }
            }
        }
    }
    light
}

/// Queues propagation for a generated chunk after it was published with
/// prefilled light: emitters spread, sky cells beside taller columns spread
/// sideways and down, and edge cells below the surface pull from neighbors.
pub fn seed_generated(chunk: &Chunk) -> Result<(), ChunkError> {
    let reg = &chunk.context().registry;
    let column = chunk.column();
    let (_, by, _) = chunk.coord().base();
    let height = |x: usize, z: usize| column.surface_height(x, z);
    for lz in 0..S {
        for lx in 0..S {
            let h = height(lx, lz);
            let edge = is_edge(lx, lz);
            let mut tallest = i32::MIN;
            for (dx, dz) in [(1i32, 0i32), (-1, 0), (0, 1), (0, -1)] {
                let (nx, nz) = (lx as i32 + dx, lz as i32 + dz);
                if (0..S as i32).contains(&nx) && (0..S as i32).contains(&nz) {
                    tallest = tallest.max(height(nx as usize, nz as usize));
                }
            }
            for ly in 0..S {
                let y = by + ly as i32;
                let id = chunk.block_local(lx, ly, lz)?.id;
                if reg.light_level(id) > 0 {
                    chunk.add_light_op(LightChannel::Block, lx, ly, lz, LightOp::Greater)?;
                }
                if reg.occludes(id) {
                    continue;
                }
                if h == HEIGHT_UNKNOWN || y > h {
                    if y == h + 1 || y <= tallest {
                        chunk.add_light_op(LightChannel::Sky, lx, ly, lz, LightOp::Greater)?;
                    }
                } else if edge {
                    chunk.add_light_op(LightChannel::Sky, lx, ly, lz, LightOp::Refresh)?;
                }
            }
        }
    }
    Ok(())
}

/// Queues a refresh of the face of `chunk` that borders the neighbor in
/// lateral direction `(dx, dz)`. Used when that neighbor arrives after
/// this chunk was lit.
pub fn refresh_face(chunk: &Chunk, dx: i32, dz: i32) -> Result<(), ChunkError> {
    let reg = &chunk.context().registry;
    let pick = |d: i32| match d {
        1 => Some(S - 1),
        -1 => Some(0),
        _ => None,
    };
    let (fx, fz) = (pick(dx), pick(dz));
    if fx.is_none() && fz.is_none() {
        return Ok(());
    }
    for ly in 0..S {
        for n in 0..S {
            let (lx, lz) = match (fx, fz) {
                (Some(x), _) => (x, n),
                (None, Some(z)) => (n, z),
                (None, None) => continue,
            };
            if reg.occludes(chunk.block_local(lx, ly, lz)?.id) {
                continue;
            }
            chunk.add_light_op(LightChannel::Block, lx, ly, lz, LightOp::Refresh)?;
            chunk.add_light_op(LightChannel::Sky, lx, ly, lz, LightOp::Refresh)?;
        }
    }
    Ok(())
}
