//! LED command packets.
//!
//! Every packet starts with a two character ASCII opcode. Indices and
//! counts travel as big-endian 16-bit values, colours as three bytes.

use serde::Deserialize;

use super::MAX_PACKAGE_LEN;
use crate::error::CommandError;

pub const OP_CLEAR_ALL: &[u8; 2] = b"LC";
pub const OP_SHOW_NOW: &[u8; 2] = b"SN";
pub const OP_SET_LED: &[u8; 2] = b"L1";
pub const OP_SET_LEDS: &[u8; 2] = b"LN";
pub const OP_SET_ALL_LEDS: &[u8; 2] = b"LA";
pub const OP_SET_LEDS_ONE_COLOUR: &[u8; 2] = b"CN";
pub const OP_SET_ALL_LEDS_ONE_COLOUR: &[u8; 2] = b"CA";

pub type Rgb = [u8; 3];

/// A display-wide command. Indices are global and get routed to boards
/// by the session before encoding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    ClearAll,
    ShowNow,
    SetLed { index: u32, rgb: Rgb },
    SetLeds { indices: Vec<u32>, rgbs: Vec<Rgb> },
    /// One colour per LED of the whole display, in index order
    SetAllLeds { rgbs: Vec<Rgb> },
    SetLedsOneColour { indices: Vec<u32>, rgb: Rgb },
    SetAllLedsOneColour { rgb: Rgb },
}

impl Command {
    /// Commands sent unchanged to every board.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Command::ClearAll | Command::ShowNow | Command::SetAllLedsOneColour { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::ClearAll => "clear_all",
            Command::ShowNow => "show_now",
            Command::SetLed { .. } => "set_led",
            Command::SetLeds { .. } => "set_leds",
            Command::SetAllLeds { .. } => "set_all_leds",
            Command::SetLedsOneColour { .. } => "set_leds_one_colour",
            Command::SetAllLedsOneColour { .. } => "set_all_leds_one_colour",
        }
    }
}

/// Split a 16-bit wire value into (high, low) bytes.
fn split_u16(value: u32, what: &str) -> Result<[u8; 2], CommandError> {
    if value > u16::MAX as u32 {
        return Err(CommandError::InvalidCommandShape(format!(
            "{} {} does not fit in 16 bits",
            what, value
        )));
    }
    Ok([(value / 256 % 256) as u8, (value % 256) as u8])
}

fn count_bytes(len: usize) -> Result<[u8; 2], CommandError> {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    split_u16(len, "LED count")
}

fn check_size(packet: Vec<u8>) -> Result<Vec<u8>, CommandError> {
    if packet.len() > MAX_PACKAGE_LEN {
        return Err(CommandError::PacketTooLarge {
            size: packet.len(),
            max: MAX_PACKAGE_LEN,
        });
    }
    Ok(packet)
}

/// Command LC
pub fn clear_all() -> Vec<u8> {
    OP_CLEAR_ALL.to_vec()
}

/// Command SN
pub fn show_now() -> Vec<u8> {
    OP_SHOW_NOW.to_vec()
}

/// Command L1
pub fn set_led(index: u32, rgb: Rgb) -> Result<Vec<u8>, CommandError> {
    let mut packet = Vec::with_capacity(7);
    packet.extend_from_slice(OP_SET_LED);
    packet.extend_from_slice(&split_u16(index, "LED index")?);
    packet.extend_from_slice(&rgb);
    Ok(packet)
}

/// Command LN
pub fn set_leds(indices: &[u32], rgbs: &[Rgb]) -> Result<Vec<u8>, CommandError> {
    if indices.len() != rgbs.len() {
        return Err(CommandError::InvalidCommandShape(format!(
            "{} indices but {} colours",
            indices.len(),
            rgbs.len()
        )));
    }
    let mut packet = Vec::with_capacity(4 + indices.len() * 5);
    packet.extend_from_slice(OP_SET_LEDS);
    packet.extend_from_slice(&count_bytes(indices.len())?);
    for (&index, rgb) in indices.iter().zip(rgbs) {
        packet.extend_from_slice(&split_u16(index, "LED index")?);
        packet.extend_from_slice(rgb);
    }
    check_size(packet)
}

/// Command LA. `rgbs` must hold exactly one colour per LED on the board.
pub fn set_all_leds(rgbs: &[Rgb], led_count: usize) -> Result<Vec<u8>, CommandError> {
    if rgbs.len() != led_count {
        return Err(CommandError::InvalidCommandShape(format!(
            "{} colours for a board of {} LEDs",
            rgbs.len(),
            led_count
        )));
    }
    let mut packet = Vec::with_capacity(2 + rgbs.len() * 3);
    packet.extend_from_slice(OP_SET_ALL_LEDS);
    for rgb in rgbs {
        packet.extend_from_slice(rgb);
    }
    check_size(packet)
}

/// Command CN
pub fn set_leds_one_colour(indices: &[u32], rgb: Rgb) -> Result<Vec<u8>, CommandError> {
    let mut packet = Vec::with_capacity(7 + indices.len() * 2);
    packet.extend_from_slice(OP_SET_LEDS_ONE_COLOUR);
    packet.extend_from_slice(&count_bytes(indices.len())?);
    packet.extend_from_slice(&rgb);
    for &index in indices {
        packet.extend_from_slice(&split_u16(index, "LED index")?);
    }
    check_size(packet)
}

/// Command CA
pub fn set_all_leds_one_colour(rgb: Rgb) -> Vec<u8> {
    let mut packet = OP_SET_ALL_LEDS_ONE_COLOUR.to_vec();
    packet.extend_from_slice(&rgb);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_only_commands() {
        assert_eq!(clear_all(), vec![76, 67]);
        assert_eq!(show_now(), b"SN".to_vec());
    }

    #[test]
    fn test_set_led_layout() {
        assert_eq!(set_led(0, [32, 0, 0]).unwrap(), vec![76, 49, 0, 0, 32, 0, 0]);
        assert_eq!(set_led(797, [1, 2, 3]).unwrap(), vec![76, 49, 3, 29, 1, 2, 3]);
    }

    #[test]
    fn test_set_led_index_out_of_range() {
        assert!(matches!(
            set_led(70_000, [0, 0, 0]),
            Err(CommandError::InvalidCommandShape(_))
        ));
    }

    #[test]
    fn test_set_leds_layout() {
        let packet = set_leds(&[1, 300], &[[10, 20, 30], [40, 50, 60]]).unwrap();
        assert_eq!(
            packet,
            vec![76, 78, 0, 2, 0, 1, 10, 20, 30, 1, 44, 40, 50, 60]
        );
    }

    #[test]
    fn test_set_leds_length_mismatch() {
        assert!(matches!(
            set_leds(&[1, 2], &[[0, 0, 0]]),
            Err(CommandError::InvalidCommandShape(_))
        ));
    }

    #[test]
    fn test_set_leds_too_large() {
        let indices: Vec<u32> = (0..2000).collect();
        let rgbs = vec![[1, 1, 1]; 2000];
        assert!(matches!(
            set_leds(&indices, &rgbs),
            Err(CommandError::PacketTooLarge { size: 10004, .. })
        ));
    }

    #[test]
    fn test_set_all_leds_layout() {
        let packet = set_all_leds(&[[1, 2, 3], [4, 5, 6]], 2).unwrap();
        assert_eq!(packet, vec![76, 65, 1, 2, 3, 4, 5, 6]);
        assert!(set_all_leds(&[[1, 2, 3]], 2).is_err());
    }

    #[test]
    fn test_set_leds_one_colour_layout() {
        let packet = set_leds_one_colour(&[5, 256], [16, 16, 16]).unwrap();
        assert_eq!(packet, vec![67, 78, 0, 2, 16, 16, 16, 0, 5, 1, 0]);
    }

    #[test]
    fn test_set_all_leds_one_colour_layout() {
        assert_eq!(set_all_leds_one_colour([36, 4, 12]), vec![67, 65, 36, 4, 12]);
    }

    #[test]
    fn test_command_from_json() {
        let cmd: Command = serde_json::from_str(r#"{"op":"set_led","index":3,"rgb":[32,0,0]}"#).unwrap();
        assert_eq!(cmd, Command::SetLed { index: 3, rgb: [32, 0, 0] });
        let cmd: Command = serde_json::from_str(r#"{"op":"clear_all"}"#).unwrap();
        assert!(cmd.is_broadcast());
        assert!(serde_json::from_str::<Command>(r#"{"op":"set_led","index":3,"rgb":[1,2]}"#).is_err());
    }
}
