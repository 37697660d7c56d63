//! Field-shape rules from §3 / §6: username and room-name charset and length.

/// Usernames are 1..8 printable non-whitespace ASCII characters.
pub const MAX_USERNAME_LEN: usize = 8;
/// Room names are 1..16 printable ASCII characters (spaces allowed).
pub const MAX_ROOMNAME_LEN: usize = 16;

pub fn is_valid_username(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_USERNAME_LEN && s.bytes().all(|b| b.is_ascii_graphic())
}

pub fn is_valid_roomname(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ROOMNAME_LEN
        && s.bytes().all(|b| b.is_ascii() && (b.is_ascii_graphic() || b == b' '))
}
