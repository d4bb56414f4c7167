use csound_sys::WINDAT;
use serde::Serialize;

use super::string_from_buffer;

/// Copy of a function-table display window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphData {
    pub id: usize,
    pub caption: String,
    /// One of `csound_sys::{NOPOL, NEGPOL, POSPOL, BIPOL}`.
    pub polarity: i16,
    pub max: f64,
    pub min: f64,
    pub absmax: f64,
    pub oabsmax: f64,
    pub samples: Vec<f64>,
}

/// # Safety
///
/// `data` must be null or point to a window whose `fdata` holds `npts` samples.
pub unsafe fn graph_from_native(data: *const WINDAT) -> Option<GraphData> {
    let window = data.as_ref()?;
    let samples = if window.fdata.is_null() || window.npts <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(window.fdata, window.npts as usize).to_vec()
    };
    Some(GraphData {
        id: window.windid,
        caption: string_from_buffer(&window.caption),
        polarity: window.polarity,
        max: window.max,
        min: window.min,
        absmax: window.absmax,
        oabsmax: window.oabsmax,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use csound_sys::{BIPOL, CAPSIZE};

    use super::*;

    #[test]
    fn copies_samples_and_caption() {
        let mut samples = vec![0.0, 1.0, 0.0, -1.0];
        let mut caption = [0 as libc::c_char; CAPSIZE];
        for (slot, byte) in caption.iter_mut().zip(b"ftable 1:") {
            *slot = *byte as libc::c_char;
        }
        let window = WINDAT {
            windid: 7,
            fdata: samples.as_mut_ptr(),
            npts: samples.len() as i32,
            caption,
            waitflg: 0,
            polarity: BIPOL,
            max: 1.0,
            min: -1.0,
            absmax: 1.0,
            oabsmax: 1.0,
            danflag: 0,
            absflag: 0,
        };
        let graph = unsafe { graph_from_native(&window) }.unwrap();
        samples[1] = 5.0;
        assert_eq!(graph.samples, [0.0, 1.0, 0.0, -1.0]);
        assert_eq!(graph.caption, "ftable 1:");
        assert_eq!(graph.polarity, BIPOL);
        assert_eq!(graph.id, 7);
    }

    #[test]
    fn null_window_is_none() {
        assert!(unsafe { graph_from_native(std::ptr::null()) }.is_none());
    }
}
