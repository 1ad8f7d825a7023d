/// Compares two byte slices without short-circuiting on the first difference.
///
/// Length mismatch returns early; the length of a token is not secret.
#[must_use]
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let difference = left
        .iter()
        .zip(right.iter())
        .fold(0_u8, |acc, (left_byte, right_byte)| acc | (left_byte ^ right_byte));

    difference == 0
}
