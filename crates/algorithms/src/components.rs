//! Connected-component labeling on boolean grids

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Pixel adjacency used when grouping pixels into regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Edge neighbours only
    Four,
    /// Edge and corner neighbours
    #[default]
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(isize, isize)] {
        const FOUR: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
        const EIGHT: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

/// One connected region: its label and member pixels as (row, col)
#[derive(Debug, Clone)]
pub struct Component {
    pub label: u32,
    pub pixels: Vec<(usize, usize)>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Label the regions of `grid` where `member` is true.
///
/// Labels start at 1 and follow row-major discovery order, so results are
/// deterministic. Returns the label grid (0 = background) and the regions.
pub fn label_components<T, F>(
    grid: &Array2<T>,
    connectivity: Connectivity,
    member: F,
) -> (Array2<u32>, Vec<Component>)
where
    F: Fn(&T) -> bool,
{
    let (rows, cols) = grid.dim();
    let mut labels = Array2::<u32>::zeros((rows, cols));
    let mut components = Vec::new();
    let offsets = connectivity.offsets();

    for r in 0..rows {
        for c in 0..cols {
            if labels[[r, c]] != 0 || !member(&grid[[r, c]]) {
                continue;
            }

            let label = components.len() as u32 + 1;
            let mut pixels = Vec::new();
            let mut stack = vec![(r, c)];
            labels[[r, c]] = label;

            while let Some((cr, cc)) = stack.pop() {
                pixels.push((cr, cc));

                for &(dr, dc) in offsets {
                    let nr = cr as isize + dr;
                    let nc = cc as isize + dc;
                    if nr < 0 || nr >= rows as isize || nc < 0 || nc >= cols as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if labels[[nr, nc]] == 0 && member(&grid[[nr, nc]]) {
                        labels[[nr, nc]] = label;
                        stack.push((nr, nc));
                    }
                }
            }

            pixels.sort_unstable();
            components.push(Component { label, pixels });
        }
    }

    (labels, components)
}
