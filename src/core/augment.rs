//! Reversible geometric augmentation shared by image stacks and label masks

use ndarray::{Array, Axis, Dimension};
use rand::Rng;

/// Counter-clockwise quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    None,
    Quarter,
    Half,
    ThreeQuarter,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Quarter,
        Rotation::Half,
        Rotation::ThreeQuarter,
    ];

    pub fn from_quarter_turns(turns: usize) -> Self {
        Self::ALL[turns % 4]
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::None => 0,
            Rotation::Quarter => 90,
            Rotation::Half => 180,
            Rotation::ThreeQuarter => 270,
        }
    }
}

/// One draw of rotation plus optional flips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Augmentation {
    pub rotation: Rotation,
    /// Mirror along the column axis
    pub flip_horizontal: bool,
    /// Mirror along the row axis
    pub flip_vertical: bool,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Augmentation {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation::None,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }

    /// Uniform rotation, then each flip independently with probability 0.5
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let rotation = Rotation::from_quarter_turns(rng.gen_range(0..4));
        let flip_horizontal = rng.gen_bool(0.5);
        let flip_vertical = rng.gen_bool(0.5);
        Self {
            rotation,
            flip_horizontal,
            flip_vertical,
        }
    }

    /// Every distinct combination, used to exercise transforms exhaustively
    pub fn all() -> Vec<Self> {
        let mut all = Vec::with_capacity(16);
        for rotation in Rotation::ALL {
            for flip_horizontal in [false, true] {
                for flip_vertical in [false, true] {
                    all.push(Self {
                        rotation,
                        flip_horizontal,
                        flip_vertical,
                    });
                }
            }
        }
        all
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Apply to the spatial axes `(rows, cols)` of an array of any rank
    pub fn apply<A: Clone, D: Dimension>(&self, array: &Array<A, D>, rows: Axis, cols: Axis) -> Array<A, D> {
        let mut view = array.view();
        match self.rotation {
            Rotation::None => {}
            Rotation::Quarter => {
                view.invert_axis(cols);
                view.swap_axes(rows.index(), cols.index());
            }
            Rotation::Half => {
                view.invert_axis(rows);
                view.invert_axis(cols);
            }
            Rotation::ThreeQuarter => {
                view.swap_axes(rows.index(), cols.index());
                view.invert_axis(cols);
            }
        }
        if self.flip_vertical {
            view.invert_axis(rows);
        }
        if self.flip_horizontal {
            view.invert_axis(cols);
        }
        view.as_standard_layout().into_owned()
    }
}
