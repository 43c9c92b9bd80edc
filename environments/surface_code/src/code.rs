//! Qubit algebra, syndrome extraction and action encoding.

/// Single-qubit Pauli operator, up to phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Pauli {
    #[default]
    I,
    X,
    Y,
    Z,
}

impl Pauli {
    /// Symplectic (x, z) components.
    #[inline]
    fn bits(self) -> (bool, bool) {
        match self {
            Pauli::I => (false, false),
            Pauli::X => (true, false),
            Pauli::Y => (true, true),
            Pauli::Z => (false, true),
        }
    }

    #[inline]
    fn from_bits(x: bool, z: bool) -> Self {
        match (x, z) {
            (false, false) => Pauli::I,
            (true, false) => Pauli::X,
            (true, true) => Pauli::Y,
            (false, true) => Pauli::Z,
        }
    }

    /// Product of two Paulis, ignoring phase.
    pub fn compose(self, other: Pauli) -> Pauli {
        let (x1, z1) = self.bits();
        let (x2, z2) = other.bits();
        Pauli::from_bits(x1 ^ x2, z1 ^ z2)
    }

    /// Flips vertex (X-type) checks.
    pub fn has_x(self) -> bool {
        self.bits().0
    }

    /// Flips plaquette (Z-type) checks.
    pub fn has_z(self) -> bool {
        self.bits().1
    }

    /// Uniformly random non-identity Pauli.
    pub fn random_error(rng: &mut fastrand::Rng) -> Pauli {
        match rng.u8(0..3) {
            0 => Pauli::X,
            1 => Pauli::Y,
            _ => Pauli::Z,
        }
    }
}

/// Decoded agent action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QubitAction {
    /// Apply `pauli` to the qubit at (`row`, `col`) in every time slice
    Correct { row: usize, col: usize, pauli: Pauli },
    /// Agent declares the syndrome decoded
    Done,
}

/// Map an action index to a correction.
///
/// Layout: `[X on all qubits | Y on all qubits | Z on all qubits | done]`.
pub fn decode_action(index: usize, distance: usize) -> Option<QubitAction> {
    let per_op = distance * distance;
    if index == 3 * per_op {
        return Some(QubitAction::Done);
    }
    if index > 3 * per_op {
        return None;
    }
    let pauli = match index / per_op {
        0 => Pauli::X,
        1 => Pauli::Y,
        _ => Pauli::Z,
    };
    let rem = index % per_op;
    Some(QubitAction::Correct {
        row: rem / distance,
        col: rem % distance,
        pauli,
    })
}

/// Inverse of [`decode_action`]. Returns `None` for identity corrections.
pub fn encode_action(action: QubitAction, distance: usize) -> Option<usize> {
    let per_op = distance * distance;
    match action {
        QubitAction::Done => Some(3 * per_op),
        QubitAction::Correct { row, col, pauli } => {
            let layer = match pauli {
                Pauli::I => return None,
                Pauli::X => 0,
                Pauli::Y => 1,
                Pauli::Z => 2,
            };
            Some(layer * per_op + row * distance + col)
        }
    }
}

/// True if stabilizer site (`i`, `j`) is a vertex (X-type) check.
#[inline]
pub fn is_vertex(i: usize, j: usize) -> bool {
    (i + j) % 2 == 0
}

/// Parity checks for one slice of `distance x distance` qubits.
///
/// Site (`i`, `j`) of the `(d+1) x (d+1)` grid touches qubits
/// (`i-1`, `j-1`), (`i-1`, `j`), (`i`, `j-1`), (`i`, `j`) where in bounds.
pub fn syndrome(qubits: &[Pauli], distance: usize, out: &mut [u8]) {
    let size = distance + 1;
    debug_assert_eq!(qubits.len(), distance * distance);
    debug_assert_eq!(out.len(), size * size);

    for i in 0..size {
        for j in 0..size {
            let vertex = is_vertex(i, j);
            let mut parity = false;
            for (qi, qj) in [(i.wrapping_sub(1), j.wrapping_sub(1)), (i.wrapping_sub(1), j), (i, j.wrapping_sub(1)), (i, j)] {
                if qi < distance && qj < distance {
                    let p = qubits[qi * distance + qj];
                    parity ^= if vertex { p.has_x() } else { p.has_z() };
                }
            }
            out[i * size + j] = parity as u8;
        }
    }
}
