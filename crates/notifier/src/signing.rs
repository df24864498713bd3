/// Signature attached to every webhook: lowercase hex MD5 of
/// `amount ‖ sender ‖ timestamp ‖ secret`.
pub fn sign(amount: &str, sender: &str, timestamp: &str, secret: &str) -> String {
    let input = format!("{}{}{}{}", amount, sender, timestamp, secret);
    format!("{:x}", md5::compute(input.as_bytes()))
}
