use crate::model::SMatrix;

/// Aggregate port space of a circuit: every component's pins laid end to
/// end, so that the circuit's state at one frequency is a single
/// block-diagonal scattering matrix.
#[derive(Debug, Clone)]
pub struct AggregateSystem {
    /// First aggregate index of each component's block
    pub offsets: Vec<usize>,
    /// Pin count of each component
    pub widths: Vec<usize>,
    /// Total system size
    pub size: usize,
}

impl AggregateSystem {
    /// Lay out blocks for components with the given pin counts, in order
    pub fn new(widths: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(widths.len());
        let mut size = 0;
        for &width in widths {
            offsets.push(size);
            size += width;
        }

        AggregateSystem {
            offsets,
            widths: widths.to_vec(),
            size,
        }
    }

    /// Aggregate index of pin `pin` on component `component`
    pub fn port_index(&self, component: usize, pin: usize) -> usize {
        self.offsets[component] + pin
    }

    /// Place one matrix per component on the diagonal; components are uncoupled
    pub fn assemble(&self, blocks: &[&SMatrix]) -> SMatrix {
        debug_assert_eq!(blocks.len(), self.offsets.len());

        let mut matrix = SMatrix::zeros(self.size, self.size);
        for ((&offset, &width), block) in self.offsets.iter().zip(&self.widths).zip(blocks) {
            if width > 0 {
                matrix.view_mut((offset, offset), (width, width)).copy_from(*block);
            }
        }
        matrix
    }
}
