use fixed::types::I32F32;

/// Q32.32 fixed-point: every rate, buffer and volume in the engine.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only when loading data, never in the tick.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64 for display.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Computes `amount * num / den`.
///
/// Multiplies first so integral inputs stay exact; falls back to dividing
/// first when the product would overflow. Returns zero for a zero `den`.
pub fn mul_div(amount: Fixed64, num: Fixed64, den: Fixed64) -> Fixed64 {
    if den == Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    if num == den {
        return amount;
    }
    match amount.checked_mul(num) {
        Some(product) => product / den,
        None => amount.saturating_mul(num / den),
    }
}
