use ffmpeg_next::ChannelLayout;

/// Default ffmpeg layout for a bare channel count.
pub fn layout_for_channels(channels: u16) -> Option<ChannelLayout> {
    match channels {
        1 => Some(ChannelLayout::MONO),
        2 => Some(ChannelLayout::STEREO),
        3 => Some(ChannelLayout::SURROUND),
        4 => Some(ChannelLayout::QUAD),
        5 => Some(ChannelLayout::_5POINT0),
        6 => Some(ChannelLayout::_5POINT1),
        7 => Some(ChannelLayout::_6POINT1),
        8 => Some(ChannelLayout::_7POINT1),
        _ => None,
    }
}

/// The frame's own layout, or the default one for its channel count when
/// the decoder left it unset. `None` when neither is known.
pub fn frame_layout(frame: &ffmpeg_next::util::frame::audio::Audio) -> Option<ChannelLayout> {
    if frame.channel_layout().bits() != 0 {
        return Some(frame.channel_layout());
    }
    layout_for_channels(frame.channels() as u16)
}
