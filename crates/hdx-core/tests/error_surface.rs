use hdx_core::errors::{ErrorInfo, HdxError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("state", "apo")
        .with_context("r_number", "12")
}

#[test]
fn input_error_surface() {
    let err = HdxError::Input(sample_info("I001", "duplicate record"));
    assert_eq!(err.info().code, "I001");
    assert!(err.info().context.contains_key("state"));
}

#[test]
fn device_error_surface() {
    let err = HdxError::Device(sample_info("D001", "no accelerator").with_hint("use cpu"));
    assert_eq!(err.info().hint.as_deref(), Some("use cpu"));
    let rendered = err.to_string();
    assert!(rendered.starts_with("device error: no accelerator (code: D001)"));
    assert!(rendered.contains("r_number=12"));
}

#[test]
fn errors_roundtrip_through_json() {
    let err = HdxError::Fit(sample_info("F001", "shape mismatch"));
    let json = serde_json::to_string(&err).unwrap();
    assert!(json.contains("\"family\":\"Fit\""));
    let back: HdxError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}
