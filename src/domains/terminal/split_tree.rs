//! Binary layout tree of the panes inside one tab.

use super::engine::PaneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    /// Children sit side by side.
    Horizontal,
    /// Children are stacked.
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Right,
    Down,
    Left,
    Up,
}

impl SplitDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "right" => Some(Self::Right),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "up" => Some(Self::Up),
            _ => None,
        }
    }

    pub fn axis(self) -> SplitAxis {
        match self {
            Self::Right | Self::Left => SplitAxis::Horizontal,
            Self::Down | Self::Up => SplitAxis::Vertical,
        }
    }

    /// Right and down place the new pane after the existing one.
    fn new_pane_second(self) -> bool {
        matches!(self, Self::Right | Self::Down)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SplitTree {
    Leaf(PaneId),
    Split {
        axis: SplitAxis,
        /// Share of the space given to `first`, in `(0, 1)`.
        ratio: f32,
        first: Box<SplitTree>,
        second: Box<SplitTree>,
    },
}

const MIN_RATIO: f32 = 0.1;
const MAX_RATIO: f32 = 0.9;

impl SplitTree {
    pub fn leaf(pane: PaneId) -> Self {
        Self::Leaf(pane)
    }

    /// Panes in reading order.
    pub fn panes(&self) -> Vec<PaneId> {
        let mut panes = Vec::new();
        self.collect_panes(&mut panes);
        panes
    }

    fn collect_panes(&self, out: &mut Vec<PaneId>) {
        match self {
            Self::Leaf(pane) => out.push(*pane),
            Self::Split { first, second, .. } => {
                first.collect_panes(out);
                second.collect_panes(out);
            }
        }
    }

    pub fn contains(&self, pane: PaneId) -> bool {
        match self {
            Self::Leaf(id) => *id == pane,
            Self::Split { first, second, .. } => first.contains(pane) || second.contains(pane),
        }
    }

    pub fn pane_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Split { first, second, .. } => first.pane_count() + second.pane_count(),
        }
    }

    /// Replaces the leaf `target` with an even split holding `target` and
    /// `new_pane`. Returns false when `target` is not in the tree.
    pub fn split(&mut self, target: PaneId, new_pane: PaneId, direction: SplitDirection) -> bool {
        match self {
            Self::Leaf(id) if *id == target => {
                let existing = Box::new(Self::Leaf(target));
                let added = Box::new(Self::Leaf(new_pane));
                let (first, second) = if direction.new_pane_second() {
                    (existing, added)
                } else {
                    (added, existing)
                };
                *self = Self::Split {
                    axis: direction.axis(),
                    ratio: 0.5,
                    first,
                    second,
                };
                true
            }
            Self::Leaf(_) => false,
            Self::Split { first, second, .. } => {
                first.split(target, new_pane, direction) || second.split(target, new_pane, direction)
            }
        }
    }

    /// Removes `target`, letting its sibling take over the parent's slot.
    /// `None` means the tree held only `target`.
    pub fn remove(self, target: PaneId) -> Option<Self> {
        match self {
            Self::Leaf(id) if id == target => None,
            leaf @ Self::Leaf(_) => Some(leaf),
            Self::Split {
                axis,
                ratio,
                first,
                second,
            } => match (first.remove(target), second.remove(target)) {
                (Some(first), Some(second)) => Some(Self::Split {
                    axis,
                    ratio,
                    first: Box::new(first),
                    second: Box::new(second),
                }),
                (Some(only), None) | (None, Some(only)) => Some(only),
                (None, None) => None,
            },
        }
    }

    pub fn equalize(&mut self) {
        if let Self::Split {
            ratio,
            first,
            second,
            ..
        } = self
        {
            *ratio = 0.5;
            first.equalize();
            second.equalize();
        }
    }

    /// Sets the ratio of the innermost split that directly contains `pane`.
    pub fn resize(&mut self, pane: PaneId, new_ratio: f32) -> bool {
        match self {
            Self::Leaf(_) => false,
            Self::Split {
                ratio,
                first,
                second,
                ..
            } => {
                if first.resize(pane, new_ratio) || second.resize(pane, new_ratio) {
                    return true;
                }
                if matches!(**first, Self::Leaf(id) if id == pane)
                    || matches!(**second, Self::Leaf(id) if id == pane)
                {
                    *ratio = new_ratio.clamp(MIN_RATIO, MAX_RATIO);
                    return true;
                }
                false
            }
        }
    }

    pub fn next_pane(&self, current: PaneId) -> Option<PaneId> {
        self.neighbour(current, 1)
    }

    pub fn previous_pane(&self, current: PaneId) -> Option<PaneId> {
        let panes = self.pane_count();
        self.neighbour(current, panes.saturating_sub(1))
    }

    fn neighbour(&self, current: PaneId, step: usize) -> Option<PaneId> {
        let panes = self.panes();
        let index = panes.iter().position(|pane| *pane == current)?;
        Some(panes[(index + step) % panes.len()])
    }
}
