//! Agent Grouping
//!
//! Coarse `<Os>_<Browser>` fingerprint of a user-agent string. Two requests
//! from the same host with the same group belong to the same client.

/// OS markers, first match wins
const OS_MARKERS: &[(&str, &str)] = &[
    ("Windows Phone", "WindowsPhone"),
    ("Windows", "Windows"),
    ("HarmonyOS", "HarmonyOS"),
    ("KAIOS", "KaiOS"),
    ("Android", "Android"),
    ("iPhone", "iOS"),
    ("iPad", "iOS"),
    ("iPod", "iOS"),
    ("CrOS", "ChromiumOS"),
    ("Mac OS X", "MacOS"),
    ("Macintosh", "MacOS"),
    ("Ubuntu", "Ubuntu"),
    ("Fedora", "Fedora"),
    ("FreeBSD", "FreeBSD"),
    ("OpenBSD", "OpenBSD"),
    ("Tizen", "Tizen"),
    ("Linux", "Linux"),
];

/// Browser markers, first match wins. In-app browsers and Chromium
/// derivatives precede Chrome, and Chrome precedes Safari since both appear
/// in Chrome's UA.
const BROWSER_MARKERS: &[(&str, &str)] = &[
    ("Instagram", "Instagram"),
    ("FBAN/", "Facebook"),
    ("FBAV/", "Facebook"),
    ("Edg/", "Edge"),
    ("Edge/", "Edge"),
    ("EdgA/", "Edge"),
    ("EdgiOS/", "Edge"),
    ("OPR/", "Opera"),
    ("Opera", "Opera"),
    ("SamsungBrowser/", "SamsungBrowser"),
    ("YaBrowser/", "Yandex"),
    ("Whale/", "Whale"),
    ("FxiOS/", "Firefox"),
    ("Firefox/", "Firefox"),
    ("CriOS/", "Chrome"),
    ("HeadlessChrome/", "ChromeHeadless"),
    ("Chromium/", "Chromium"),
    ("Chrome/", "Chrome"),
    ("MSIE ", "IE"),
    ("Trident/", "IE"),
    ("Safari/", "Safari"),
];

const UNKNOWN: &str = "Unknown";

pub fn agent_group(user_agent: Option<&str>) -> String {
    let ua = user_agent.unwrap_or_default();

    let os = first_marker(ua, OS_MARKERS).unwrap_or(UNKNOWN);
    let browser = match first_marker(ua, BROWSER_MARKERS) {
        Some("Chrome") if ua.contains("; wv)") => "ChromeWebView",
        Some("Firefox") if ua.contains("Mobile;") || ua.contains("Tablet;") => "MobileFirefox",
        Some("Safari") if ua.contains("Android") && ua.contains("Version/") => "AndroidBrowser",
        Some("Safari") if ua.contains("Mobile/") => "MobileSafari",
        Some(name) => name,
        None => UNKNOWN,
    };

    format!("{os}_{browser}")
}

fn first_marker(ua: &str, markers: &[(&str, &'static str)]) -> Option<&'static str> {
    markers
        .iter()
        .find(|(needle, _)| ua.contains(needle))
        .map(|(_, name)| *name)
}
