//! Build script for streamengine-gst.
//!
//! Checks that the GStreamer development files are available.

fn main() {
    for library in ["gstreamer-1.0", "gstreamer-video-1.0"] {
        if let Err(e) = pkg_config::probe_library(library) {
            eprintln!("Warning: {library} not found: {e}");
            eprintln!("Install gstreamer1-devel and gstreamer1-plugins-base-devel (Fedora) or libgstreamer-plugins-base1.0-dev (Debian/Ubuntu)");
        }
    }
}
