//! Data-format descriptors and channel-axis resolution
//!
//! A data format is a short axis code such as `"NHWC"` or `"NCHW"` (N=batch,
//! C=channel, D/H/W=spatial), or one of the literal aliases
//! [`CHANNELS_FIRST`] / [`CHANNELS_LAST`]. Resolution maps the descriptor to
//! the index of the channel axis: `-1` for channel-last layouts, `1` for
//! channel-first layouts.

use crate::error::{NormError, Result};

/// Alias for layouts whose channel axis follows the batch axis (e.g. NCHW).
pub const CHANNELS_FIRST: &str = "channels_first";
/// Alias for layouts whose channel axis is the last axis (e.g. NHWC).
pub const CHANNELS_LAST: &str = "channels_last";

/// Axis letters an explicit format code may be built from.
const AXIS_LETTERS: [char; 5] = ['N', 'C', 'D', 'H', 'W'];

/// Resolve a data-format descriptor to its channel-axis index.
///
/// Returns `-1` when the channel axis is the last axis and `1` when it
/// immediately follows the batch axis. Any other arrangement, an absent
/// channel marker, or an unknown alias is rejected with
/// [`NormError::InvalidConfiguration`] naming the offending descriptor.
///
/// # Examples
///
/// ```
/// use tennorm::data_format::channel_index;
///
/// assert_eq!(channel_index("NHWC").unwrap(), -1);
/// assert_eq!(channel_index("NCHW").unwrap(), 1);
/// assert!(channel_index("HWC").is_err());
/// ```
pub fn channel_index(data_format: &str) -> Result<isize> {
    if data_format == CHANNELS_LAST {
        return Ok(-1);
    }
    if data_format == CHANNELS_FIRST {
        return Ok(1);
    }

    let letters: Vec<char> = data_format.chars().collect();
    let recognized = letters.len() >= 2
        && letters[0] == 'N'
        && letters.iter().all(|c| AXIS_LETTERS.contains(c))
        && letters.iter().filter(|&&c| c == 'C').count() == 1;

    if recognized {
        // Position checks run last-axis first so the rank-2 "NC" code,
        // where both rules apply, resolves to -1 (equivalent for rank 2).
        let position = letters.iter().position(|&c| c == 'C').unwrap_or(0);
        if position == letters.len() - 1 {
            return Ok(-1);
        }
        if position == 1 {
            return Ok(1);
        }
    }

    Err(NormError::invalid_configuration(format!(
        "Unable to extract channel information from '{data_format}'. \
         Valid data formats are spatial codes (e.g. `NCHW`, `NHWC`), \
         `channels_first` and `channels_last`"
    )))
}

/// Convert a channel-axis index (possibly negative) to a concrete axis for
/// a tensor of the given rank.
pub(crate) fn resolve_axis(channel_index: isize, rank: usize) -> usize {
    if channel_index < 0 {
        (rank as isize + channel_index) as usize
    } else {
        channel_index as usize
    }
}
