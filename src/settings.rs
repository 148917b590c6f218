//! Settings for the uploader: application identity, release feed locations,
//! serial framing and the timing of the bootloader handshake.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::{fmt, str::FromStr, time::Duration};

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::{error::Error, handshake::HandshakeTiming};

/// Human readable application name.
pub const APP_NAME: &str = "HEX Uploader";

// =============================================================================
// Public Interface
// =============================================================================

/// The flavour of the running application. Each flavour is packaged as its own
/// release asset.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AppVariant {
    Cli,
    Gui,
}
impl AppVariant {
    /// Prefix of the packaged update asset for this flavour.
    pub fn asset_prefix(self) -> &'static str {
        match self {
            AppVariant::Cli => "HEXUploaderCLI",
            AppVariant::Gui => "HEXUploader",
        }
    }
}
impl fmt::Display for AppVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppVariant::Cli => f.write_str("CLI"),
            AppVariant::Gui => f.write_str("GUI"),
        }
    }
}
impl FromStr for AppVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLI" | "cli" => Ok(AppVariant::Cli),
            "GUI" | "gui" => Ok(AppVariant::Gui),
            other => Err(Error::UnknownAppVariant(other.to_owned())),
        }
    }
}

/// Groups all settings used by the uploader and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// Which packaged flavour is running.
    pub app_variant: AppVariant,
    /// Version of the running application, compared against release names.
    pub app_version: String,
    /// Endpoint listing the published releases as JSON.
    pub releases_api_url: String,
    /// Prefix of the release download links.
    pub releases_download_url: String,
    /// Name of the scratch directory created under the OS temp root.
    pub tmp_dir_name: String,

    /// A specific port address to wait for. When not set, the most recently
    /// attached board is used.
    pub port: Option<String>,
    /// Path to the firmware image to be flashed.
    pub hex_file: Option<String>,

    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// Delays used while toggling a board into its bootloader.
    pub handshake_timing: HandshakeTiming,
    /// How often attached serial ports are enumerated.
    pub poll_interval: Duration,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new().port("/dev/ttyUSB0").finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl SettingsBuilder {
    /// Start building the settings using default values, no port and no
    /// firmware image.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                app_variant: AppVariant::Cli,
                app_version: format!("v{}", env!("CARGO_PKG_VERSION")),
                releases_api_url: "https://api.github.com/repos/wingnut-tech/HEXUploader/releases"
                    .into(),
                releases_download_url: "https://github.com/wingnut-tech/HEXUploader/releases"
                    .into(),
                tmp_dir_name: "HEXUploader".into(),
                port: None,
                hex_file: None,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                handshake_timing: HandshakeTiming::default(),
                poll_interval: Duration::from_millis(500),
                _private_use_builder: (),
            },
        }
    }

    pub fn app_variant(mut self, app_variant: AppVariant) -> Self {
        self.settings.app_variant = app_variant;
        self
    }

    pub fn app_version<'a>(mut self, version: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.app_version = version.into().into_owned();
        self
    }

    pub fn releases_api_url<'a>(mut self, url: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.releases_api_url = url.into().into_owned();
        self
    }

    pub fn releases_download_url<'a>(mut self, url: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.releases_download_url = url.into().into_owned();
        self
    }

    pub fn tmp_dir_name<'a>(mut self, name: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.tmp_dir_name = name.into().into_owned();
        self
    }

    /// Set the address of the serial port to wait for
    pub fn port<'a>(mut self, port: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.port = Some(port.into().into_owned());
        self
    }

    /// Set the path to the firmware image
    pub fn hex_file<'a>(mut self, hex_file: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.hex_file = Some(hex_file.into().into_owned());
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    pub fn handshake_timing(mut self, timing: HandshakeTiming) -> Self {
        self.settings.handshake_timing = timing;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_default() {
        let settings = SettingsBuilder::new().finalize();
        assert_eq!(settings.app_variant, AppVariant::Cli);
        assert_eq!(settings.app_version, format!("v{}", env!("CARGO_PKG_VERSION")));
        assert_eq!(settings.tmp_dir_name, "HEXUploader");
        assert_eq!(settings.port, None);
        assert_eq!(settings.hex_file, None);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.flow_control, FlowControl::None);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.handshake_timing, HandshakeTiming::default());
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn port() {
        let settings = SettingsBuilder::new().port("/dev/ttyUSB0").finalize();
        assert_eq!(settings.port.unwrap(), "/dev/ttyUSB0");
    }

    #[test]
    fn hex_file() {
        let settings = SettingsBuilder::new().hex_file("firmware.hex").finalize();
        assert_eq!(settings.hex_file.unwrap(), "firmware.hex");
    }

    #[test]
    fn app_identity() {
        let settings = SettingsBuilder::new()
            .app_variant(AppVariant::Gui)
            .app_version("v0.9.0")
            .tmp_dir_name("HEXUploaderTest")
            .finalize();
        assert_eq!(settings.app_variant, AppVariant::Gui);
        assert_eq!(settings.app_version, "v0.9.0");
        assert_eq!(settings.tmp_dir_name, "HEXUploaderTest");
    }

    #[test]
    fn release_urls() {
        let settings = SettingsBuilder::new()
            .releases_api_url("http://localhost/releases")
            .releases_download_url("http://localhost/download")
            .finalize();
        assert_eq!(settings.releases_api_url, "http://localhost/releases");
        assert_eq!(settings.releases_download_url, "http://localhost/download");
    }

    #[test]
    fn framing() {
        let settings = SettingsBuilder::new()
            .data_bits(DataBits::Seven)
            .flow_control(FlowControl::Hardware)
            .parity(Parity::Even)
            .stop_bits(StopBits::Two)
            .finalize();
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.flow_control, FlowControl::Hardware);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.stop_bits, StopBits::Two);
    }

    #[test]
    fn timing() {
        let settings = SettingsBuilder::new()
            .handshake_timing(HandshakeTiming::immediate())
            .poll_interval(Duration::from_millis(10))
            .finalize();
        assert_eq!(settings.handshake_timing, HandshakeTiming::immediate());
        assert_eq!(settings.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn app_variant_text() {
        assert_eq!("CLI".parse::<AppVariant>().unwrap(), AppVariant::Cli);
        assert_eq!("gui".parse::<AppVariant>().unwrap(), AppVariant::Gui);
        assert!(matches!(
            "TUI".parse::<AppVariant>(),
            Err(Error::UnknownAppVariant(ref v)) if v == "TUI"
        ));
        assert_eq!(AppVariant::Gui.to_string(), "GUI");
    }
}
