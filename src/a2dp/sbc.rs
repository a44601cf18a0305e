use bitflags::bitflags;
use enum_iterator::{all, Sequence};
use instructor::{ByteSize, Exstruct, Instruct};

/// Lowest bitpool the source offers by default.
pub const DEFAULT_MIN_BITPOOL: u8 = 2;
/// Highest bitpool the source offers by default.
pub const DEFAULT_MAX_BITPOOL: u8 = 0x35;

// ([A2DP] Section 4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Instruct, Exstruct)]
#[instructor(endian = "big")]
pub struct SbcMediaCodecInformation {
    #[instructor(bitfield(u8))]
    #[instructor(bits(4..8))]
    pub sampling_frequencies: SamplingFrequencies,
    #[instructor(bits(0..4))]
    pub channel_modes: ChannelModes,
    #[instructor(bitfield(u8))]
    #[instructor(bits(4..8))]
    pub block_lengths: BlockLengths,
    #[instructor(bits(2..4))]
    pub subbands: Subbands,
    #[instructor(bits(0..2))]
    pub allocation_methods: AllocationMethods,
    pub minimum_bitpool: u8,
    pub maximum_bitpool: u8,
}

impl Default for SbcMediaCodecInformation {
    fn default() -> Self {
        SbcMediaCodecInformation {
            sampling_frequencies: SamplingFrequencies::all(),
            channel_modes: ChannelModes::all(),
            block_lengths: BlockLengths::all(),
            subbands: Subbands::all(),
            allocation_methods: AllocationMethods::all(),
            minimum_bitpool: DEFAULT_MIN_BITPOOL,
            maximum_bitpool: DEFAULT_MAX_BITPOOL,
        }
    }
}

impl SbcMediaCodecInformation {

    /// Bitpool bounds are ordered and within [2, 250] ([A2DP] Section 4.3.2.6).
    pub fn has_valid_bitpool_range(&self) -> bool {
        self.minimum_bitpool >= 2
            && self.maximum_bitpool <= 250
            && self.minimum_bitpool <= self.maximum_bitpool
    }

    /// Builds the configuration to offer against the advertised capabilities:
    /// the most preferred supported value of every field, the default bitpool
    /// window clamped into the advertised range.
    ///
    /// `None` if any field has no overlap with what this source can produce.
    pub fn negotiate(&self) -> Option<SbcMediaCodecInformation> {
        let frequency = choose(|value: SamplingFrequency| self.sampling_frequencies.contains(value.as_flag()))?;
        let mode = choose(|value: ChannelMode| self.channel_modes.contains(value.as_flag()))?;
        let blocks = choose(|value: BlockLength| self.block_lengths.contains(value.as_flag()))?;
        let subbands = choose(|value: SubbandCount| self.subbands.contains(value.as_flag()))?;
        let allocation = choose(|value: AllocationMethod| self.allocation_methods.contains(value.as_flag()))?;
        let minimum_bitpool = self.minimum_bitpool.max(DEFAULT_MIN_BITPOOL);
        let maximum_bitpool = self.maximum_bitpool.min(DEFAULT_MAX_BITPOOL);
        (minimum_bitpool <= maximum_bitpool).then_some(SbcMediaCodecInformation {
            sampling_frequencies: frequency.as_flag(),
            channel_modes: mode.as_flag(),
            block_lengths: blocks.as_flag(),
            subbands: subbands.as_flag(),
            allocation_methods: allocation.as_flag(),
            minimum_bitpool,
            maximum_bitpool,
        })
    }

    pub fn sampling_frequency(&self) -> Option<SamplingFrequency> {
        all().find(|value: &SamplingFrequency| value.as_flag() == self.sampling_frequencies)
    }

    pub fn channel_mode(&self) -> Option<ChannelMode> {
        all().find(|value: &ChannelMode| value.as_flag() == self.channel_modes)
    }

    pub fn block_length(&self) -> Option<BlockLength> {
        all().find(|value: &BlockLength| value.as_flag() == self.block_lengths)
    }

    pub fn subband_count(&self) -> Option<SubbandCount> {
        all().find(|value: &SubbandCount| value.as_flag() == self.subbands)
    }

    pub fn allocation_method(&self) -> Option<AllocationMethod> {
        all().find(|value: &AllocationMethod| value.as_flag() == self.allocation_methods)
    }

    /// Whether every field selects exactly one value, i.e. this is a
    /// configuration rather than a capability set.
    pub fn is_selection(&self) -> bool {
        self.sampling_frequency().is_some()
            && self.channel_mode().is_some()
            && self.block_length().is_some()
            && self.subband_count().is_some()
            && self.allocation_method().is_some()
    }

}

fn choose<T: Sequence + Copy>(supported: impl Fn(T) -> bool) -> Option<T> {
    all::<T>().find(|value| supported(*value))
}

// ([A2DP] Section 4.3.2.1).
bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct)]
    #[instructor(bitflags)]
    pub struct SamplingFrequencies: u8 {
        const FREQ_16000 = 0b1000;
        const FREQ_32000 = 0b0100;
        const FREQ_44100 = 0b0010;
        const FREQ_48000 = 0b0001;
    }
}

// ([A2DP] Section 4.3.2.2).
bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct)]
    #[instructor(bitflags)]
    pub struct ChannelModes: u8 {
        const MONO = 0b1000;
        const DUAL_CHANNEL = 0b0100;
        const STEREO = 0b0010;
        const JOINT_STEREO = 0b0001;
    }
}

// ([A2DP] Section 4.3.2.3).
bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct)]
    #[instructor(bitflags)]
    pub struct BlockLengths: u8 {
        const FOUR = 0b1000;
        const EIGHT = 0b0100;
        const TWELVE = 0b0010;
        const SIXTEEN = 0b0001;
    }
}

// ([A2DP] Section 4.3.2.4).
bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct)]
    #[instructor(bitflags)]
    pub struct Subbands: u8 {
        const FOUR = 0b10;
        const EIGHT = 0b01;
    }
}

// ([A2DP] Section 4.3.2.5).
bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Instruct, Exstruct)]
    #[instructor(bitflags)]
    pub struct AllocationMethods: u8 {
        const SNR = 0b10;
        const LOUDNESS = 0b01;
    }
}

// The choice enums below are ordered by this source's preference, so the
// first supported variant is the one offered.

#[derive(Debug, Copy, Clone, Eq, PartialEq, Sequence)]
pub enum SamplingFrequency {
    Hz44100,
    Hz48000,
    Hz32000,
    Hz16000,
}

impl SamplingFrequency {
    pub fn as_flag(self) -> SamplingFrequencies {
        match self {
            SamplingFrequency::Hz44100 => SamplingFrequencies::FREQ_44100,
            SamplingFrequency::Hz48000 => SamplingFrequencies::FREQ_48000,
            SamplingFrequency::Hz32000 => SamplingFrequencies::FREQ_32000,
            SamplingFrequency::Hz16000 => SamplingFrequencies::FREQ_16000,
        }
    }

    pub fn hertz(self) -> u32 {
        match self {
            SamplingFrequency::Hz44100 => 44100,
            SamplingFrequency::Hz48000 => 48000,
            SamplingFrequency::Hz32000 => 32000,
            SamplingFrequency::Hz16000 => 16000,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Sequence)]
pub enum ChannelMode {
    JointStereo,
    Stereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    pub fn as_flag(self) -> ChannelModes {
        match self {
            ChannelMode::JointStereo => ChannelModes::JOINT_STEREO,
            ChannelMode::Stereo => ChannelModes::STEREO,
            ChannelMode::DualChannel => ChannelModes::DUAL_CHANNEL,
            ChannelMode::Mono => ChannelModes::MONO,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Sequence)]
pub enum BlockLength {
    Sixteen,
    Twelve,
    Eight,
    Four,
}

impl BlockLength {
    pub fn as_flag(self) -> BlockLengths {
        match self {
            BlockLength::Sixteen => BlockLengths::SIXTEEN,
            BlockLength::Twelve => BlockLengths::TWELVE,
            BlockLength::Eight => BlockLengths::EIGHT,
            BlockLength::Four => BlockLengths::FOUR,
        }
    }

    pub fn blocks(self) -> u8 {
        match self {
            BlockLength::Sixteen => 16,
            BlockLength::Twelve => 12,
            BlockLength::Eight => 8,
            BlockLength::Four => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Sequence)]
pub enum SubbandCount {
    Four,
    Eight,
}

impl SubbandCount {
    pub fn as_flag(self) -> Subbands {
        match self {
            SubbandCount::Four => Subbands::FOUR,
            SubbandCount::Eight => Subbands::EIGHT,
        }
    }

    pub fn count(self) -> u8 {
        match self {
            SubbandCount::Four => 4,
            SubbandCount::Eight => 8,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Sequence)]
pub enum AllocationMethod {
    Loudness,
    Snr,
}

impl AllocationMethod {
    pub fn as_flag(self) -> AllocationMethods {
        match self {
            AllocationMethod::Loudness => AllocationMethods::LOUDNESS,
            AllocationMethod::Snr => AllocationMethods::SNR,
        }
    }
}

impl ByteSize for SbcMediaCodecInformation {
    fn byte_size(&self) -> usize {
        4
    }
}
