//! Palette construction.
//!
//! All three methods work on a histogram of distinct RGB colors and return at
//! most `max_colors` palette entries. When the image already has no more than
//! `max_colors` distinct colors the exact colors are returned, so quantizing
//! never invents colors that were not needed.

use image::RgbImage;
use std::collections::HashMap;

use super::QuantizeMethod;

/// A histogram entry: color and number of pixels carrying it
pub type ColorCount = ([u8; 3], u64);

/// Build a palette of at most `max_colors` entries for `img`
pub fn build_palette(img: &RgbImage, max_colors: usize, method: QuantizeMethod) -> Vec<[u8; 3]> {
    let max_colors = max_colors.max(1);
    let histogram = color_histogram(img);

    if histogram.is_empty() {
        return vec![[0, 0, 0]];
    }

    if histogram.len() <= max_colors {
        return histogram.into_iter().map(|(color, _)| color).collect();
    }

    match method {
        QuantizeMethod::MedianCut => box_split_palette(histogram, max_colors, SplitPolicy::WidestRange),
        QuantizeMethod::MaxCoverage => box_split_palette(histogram, max_colors, SplitPolicy::LargestPopulation),
        QuantizeMethod::FastOctree => {
            let mut tree = Octree::new();
            for (color, count) in &histogram {
                tree.insert(*color, *count);
            }
            tree.reduce(max_colors);
            tree.palette()
        }
    }
}

/// Distinct colors with their pixel counts, sorted by color for determinism
pub fn color_histogram(img: &RgbImage) -> Vec<ColorCount> {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for pixel in img.pixels() {
        *counts.entry(pixel.0).or_insert(0) += 1;
    }

    let mut histogram: Vec<ColorCount> = counts.into_iter().collect();
    histogram.sort_unstable_by_key(|(color, _)| *color);
    histogram
}

#[derive(Debug, Clone, Copy)]
enum SplitPolicy {
    /// Split the box spanning the widest channel range (median cut)
    WidestRange,
    /// Split the box covering the most pixels (maximum coverage)
    LargestPopulation,
}

#[derive(Debug)]
struct ColorBox {
    colors: Vec<ColorCount>,
    population: u64,
}

impl ColorBox {
    fn new(colors: Vec<ColorCount>) -> Self {
        let population = colors.iter().map(|(_, count)| count).sum();
        Self { colors, population }
    }

    /// (channel, range) of the channel with the widest spread
    fn widest_channel(&self) -> (usize, u8) {
        let mut min = [u8::MAX; 3];
        let mut max = [u8::MIN; 3];
        for (color, _) in &self.colors {
            for c in 0..3 {
                min[c] = min[c].min(color[c]);
                max[c] = max[c].max(color[c]);
            }
        }

        (0..3)
            .map(|c| (c, max[c] - min[c]))
            .max_by_key(|&(c, range)| (range, std::cmp::Reverse(c)))
            .unwrap_or((0, 0))
    }

    /// Split at the population median along the widest channel
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.colors
            .sort_unstable_by_key(|(color, _)| (color[channel], *color));

        let half = self.population / 2;
        let mut running = 0u64;
        let mut cut = 1;
        for (i, (_, count)) in self.colors.iter().enumerate() {
            running += count;
            if running >= half {
                cut = i + 1;
                break;
            }
        }
        // Both halves must keep at least one color
        let cut = cut.clamp(1, self.colors.len() - 1);

        let upper = self.colors.split_off(cut);
        (ColorBox::new(self.colors), ColorBox::new(upper))
    }

    fn mean(&self) -> [u8; 3] {
        let mut sum = [0u64; 3];
        for (color, count) in &self.colors {
            for c in 0..3 {
                sum[c] += color[c] as u64 * count;
            }
        }
        average(sum, self.population)
    }
}

fn box_split_palette(histogram: Vec<ColorCount>, max_colors: usize, policy: SplitPolicy) -> Vec<[u8; 3]> {
    let mut boxes = vec![ColorBox::new(histogram)];

    while boxes.len() < max_colors {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| match policy {
                SplitPolicy::WidestRange => (b.widest_channel().1 as u64, b.population),
                SplitPolicy::LargestPopulation => (b.population, b.widest_channel().1 as u64),
            })
            .map(|(i, _)| i);

        let Some(index) = candidate else {
            break;
        };

        let (low, high) = boxes.swap_remove(index).split();
        boxes.push(low);
        boxes.push(high);
    }

    boxes.iter().map(ColorBox::mean).collect()
}

fn average(sum: [u64; 3], count: u64) -> [u8; 3] {
    if count == 0 {
        return [0, 0, 0];
    }
    let half = count / 2;
    [
        ((sum[0] + half) / count).min(255) as u8,
        ((sum[1] + half) / count).min(255) as u8,
        ((sum[2] + half) / count).min(255) as u8,
    ]
}

const OCTREE_DEPTH: usize = 8;

#[derive(Debug, Default)]
struct OctreeNode {
    children: [Option<usize>; 8],
    sum: [u64; 3],
    count: u64,
    leaf: bool,
}

impl OctreeNode {
    fn add(&mut self, color: [u8; 3], count: u64) {
        for c in 0..3 {
            self.sum[c] += color[c] as u64 * count;
        }
        self.count += count;
    }
}

/// Arena-backed octree; every node accumulates the colors passing through it,
/// so folding a node into a leaf needs no extra bookkeeping.
struct Octree {
    nodes: Vec<OctreeNode>,
    /// Internal (non-leaf) nodes per level
    levels: Vec<Vec<usize>>,
    leaves: usize,
}

impl Octree {
    fn new() -> Self {
        let mut levels = vec![Vec::new(); OCTREE_DEPTH];
        levels[0].push(0);
        Self {
            nodes: vec![OctreeNode::default()],
            levels,
            leaves: 0,
        }
    }

    fn child_index(color: [u8; 3], level: usize) -> usize {
        let shift = 7 - level;
        (((color[0] >> shift) & 1) as usize) << 2
            | (((color[1] >> shift) & 1) as usize) << 1
            | ((color[2] >> shift) & 1) as usize
    }

    fn insert(&mut self, color: [u8; 3], count: u64) {
        let mut node = 0;
        self.nodes[node].add(color, count);

        for level in 0..OCTREE_DEPTH {
            let slot = Self::child_index(color, level);
            let next = match self.nodes[node].children[slot] {
                Some(existing) => existing,
                None => {
                    let created = self.nodes.len();
                    let leaf = level + 1 == OCTREE_DEPTH;
                    self.nodes.push(OctreeNode {
                        leaf,
                        ..OctreeNode::default()
                    });
                    if leaf {
                        self.leaves += 1;
                    } else {
                        self.levels[level + 1].push(created);
                    }
                    self.nodes[node].children[slot] = Some(created);
                    created
                }
            };
            self.nodes[next].add(color, count);
            node = next;
        }
    }

    /// Fold the least populated deepest nodes until at most `max_colors` leaves remain
    fn reduce(&mut self, max_colors: usize) {
        for level in (0..OCTREE_DEPTH).rev() {
            let mut candidates = std::mem::take(&mut self.levels[level]);
            candidates.sort_by_key(|&index| (self.nodes[index].count, index));

            for index in candidates {
                if self.leaves <= max_colors {
                    return;
                }
                let node = &mut self.nodes[index];
                let children = node.children.iter().filter(|c| c.is_some()).count();
                node.children = [None; 8];
                node.leaf = true;
                self.leaves = self.leaves + 1 - children;
            }
        }
    }

    fn palette(&self) -> Vec<[u8; 3]> {
        let mut palette = Vec::with_capacity(self.leaves);
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.leaf {
                palette.push(average(node.sum, node.count));
            } else {
                stack.extend(node.children.iter().rev().flatten());
            }
        }
        palette
    }
}
