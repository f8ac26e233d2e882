//! Binary mask morphology, connected components, and contour tracing.
//!
//! Masks are `ImageU8` with 0 = background and 255 = foreground. Dilation
//! and erosion use a square kernel and run separably (two max/min passes),
//! so one pass costs `O(w * h * k)` rather than `O(w * h * k^2)`.

use stereo_core::ImageU8;

/// 255 where `lo <= v <= hi`, else 0.
pub fn in_range(img: &ImageU8, lo: u8, hi: u8) -> ImageU8 {
    let (w, h) = img.size();
    let mut out = ImageU8::new(w, h, 0);
    for y in 0..h {
        for x in 0..w {
            let v = img.get(x, y);
            if v >= lo && v <= hi {
                out.set(x, y, 255);
            }
        }
    }
    out
}

fn horizontal_pass(src: &ImageU8, radius: usize, dilate: bool) -> ImageU8 {
    let (w, h) = src.size();
    let mut out = ImageU8::new(w, h, 0);
    for y in 0..h {
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(w - 1);
            let mut hit = !dilate;
            for xx in x0..=x1 {
                let fg = src.get(xx, y) != 0;
                if dilate && fg {
                    hit = true;
                    break;
                }
                if !dilate && !fg {
                    hit = false;
                    break;
                }
            }
            // Erosion treats out-of-bounds as background.
            if !dilate && (x < radius || x + radius >= w) {
                hit = false;
            }
            if hit {
                out.set(x, y, 255);
            }
        }
    }
    out
}

fn vertical_pass(src: &ImageU8, radius: usize, dilate: bool) -> ImageU8 {
    let (w, h) = src.size();
    let mut out = ImageU8::new(w, h, 0);
    for x in 0..w {
        for y in 0..h {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius).min(h - 1);
            let mut hit = !dilate;
            for yy in y0..=y1 {
                let fg = src.get(x, yy) != 0;
                if dilate && fg {
                    hit = true;
                    break;
                }
                if !dilate && !fg {
                    hit = false;
                    break;
                }
            }
            if !dilate && (y < radius || y + radius >= h) {
                hit = false;
            }
            if hit {
                out.set(x, y, 255);
            }
        }
    }
    out
}

/// Binary dilation with a `kernel_size x kernel_size` square kernel.
pub fn dilate(src: &ImageU8, kernel_size: usize, iterations: usize) -> ImageU8 {
    let radius = kernel_size / 2;
    let mut img = src.clone();
    for _ in 0..iterations {
        img = vertical_pass(&horizontal_pass(&img, radius, true), radius, true);
    }
    img
}

/// Binary erosion with a `kernel_size x kernel_size` square kernel.
pub fn erode(src: &ImageU8, kernel_size: usize, iterations: usize) -> ImageU8 {
    let radius = kernel_size / 2;
    let mut img = src.clone();
    for _ in 0..iterations {
        img = vertical_pass(&horizontal_pass(&img, radius, false), radius, false);
    }
    img
}

/// One 8-connected foreground region.
#[derive(Clone, Debug)]
pub struct Component {
    /// Every pixel of the region, in scan order of discovery.
    pub pixels: Vec<(u32, u32)>,
    /// Scan-order first pixel (topmost, then leftmost); boundary tracing
    /// starts here.
    pub anchor: (u32, u32),
}

impl Component {
    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}

/// Label all 8-connected foreground regions.
pub fn connected_components(mask: &ImageU8) -> Vec<Component> {
    let (w, h) = mask.size();
    let mut visited = vec![false; w * h];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if mask.get(x, y) == 0 || visited[y * w + x] {
                continue;
            }
            let mut pixels = Vec::new();
            visited[y * w + x] = true;
            stack.push((x, y));
            while let Some((cx, cy)) = stack.pop() {
                pixels.push((cx as u32, cy as u32));
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = cx as i64 + dx;
                        let ny = cy as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as usize, ny as usize);
                        if mask.get(nx, ny) != 0 && !visited[ny * w + nx] {
                            visited[ny * w + nx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            components.push(Component {
                anchor: (x as u32, y as u32),
                pixels,
            });
        }
    }
    components
}

/// Moore-neighbour clockwise scan order.
const MOORE: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Trace the outer boundary of the region containing `anchor`.
///
/// `anchor` must be the scan-order first pixel of its component so that its
/// west neighbour is background. Returns the closed boundary in clockwise
/// order; a single isolated pixel yields a one-point contour.
pub fn trace_boundary(mask: &ImageU8, anchor: (u32, u32)) -> Vec<(u32, u32)> {
    let (w, h) = mask.size();
    let fg = |x: i64, y: i64| {
        x >= 0 && y >= 0 && x < w as i64 && y < h as i64 && mask.get(x as usize, y as usize) != 0
    };

    let start = (anchor.0 as i64, anchor.1 as i64);
    let mut contour = vec![anchor];
    // We "entered" the start pixel from its west background neighbour.
    let mut backtrack_dir = 4usize; // index of (-1, 0) in MOORE
    let mut current = start;

    let max_steps = 4 * (w * h).max(1);
    for _ in 0..max_steps {
        // Scan clockwise starting just after the backtrack direction.
        let mut found = None;
        for step in 1..=8 {
            let dir = (backtrack_dir + step) % 8;
            let (dx, dy) = MOORE[dir];
            if fg(current.0 + dx, current.1 + dy) {
                found = Some(dir);
                break;
            }
        }
        let Some(dir) = found else {
            break; // isolated pixel
        };
        let (dx, dy) = MOORE[dir];
        current = (current.0 + dx, current.1 + dy);
        if current == start {
            break;
        }
        contour.push((current.0 as u32, current.1 as u32));
        // Next scan starts from the direction pointing back where we came from.
        backtrack_dir = (dir + 4) % 8;
    }
    contour
}
