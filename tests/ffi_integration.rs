//! Integration tests for the C ABI surface, driven from Rust as a stand-in
//! for a foreign caller. The FFI module owns a process-wide singleton, so
//! these tests run serially against a single mocked issuer.

mod common;

use std::ffi::{CStr, CString};

use oidc_rp_validator::ffi::*;
use oidc_rp_validator::ErrStatus;
use serde_json::json;

unsafe fn take_string(ptr: *mut std::os::raw::c_char) -> String {
	assert!(!ptr.is_null());
	let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_string();
	oidcrp_free_string(ptr);
	s
}

#[cfg(feature = "integration-tests")]
#[tokio::test]
async fn full_ffi_lifecycle_against_a_mocked_issuer() {
	let (priv_key, pub_key) = common::rsa_keypair();
	let server = common::mock_issuer(vec![common::jwk_json(&pub_key, "k1")]).await;

	let issuer = CString::new(server.uri()).unwrap();
	assert_eq!(oidcrp_initialize(issuer.as_ptr()), ErrStatus::None.code());
	assert_eq!(oidcrp_wait_until_ready(5), ErrStatus::None.code());

	let token = common::sign_token(
		&priv_key,
		"k1",
		&json!({
			"sub": "alice",
			"exp": 9_999_999_999i64,
			"kc.isAccessToken": true,
			"kc.identity": {"kc.i.id": "u-42"},
			"kc.authorizedScopes": ["openid", "profile"],
		}),
	);
	let token_c = CString::new(token).unwrap();

	let mut out_subject = std::ptr::null_mut();
	let mut out_token_type = 0u64;
	let mut out_std_json = std::ptr::null_mut();
	let mut out_extra_json = std::ptr::null_mut();

	let status = oidcrp_validate_token_s(
		token_c.as_ptr(),
		&mut out_subject,
		&mut out_token_type,
		&mut out_std_json,
		&mut out_extra_json,
	);
	assert_eq!(status, ErrStatus::None.code());
	assert_eq!(out_token_type, 1); // KCAccess
	let subject = unsafe { take_string(out_subject) };
	assert_eq!(subject, "u-42");
	unsafe {
		oidcrp_free_string(out_std_json);
		oidcrp_free_string(out_extra_json);
	}

	let scope_granted = CString::new("openid").unwrap();
	let mut out_subject2 = std::ptr::null_mut();
	let mut out_tt2 = 0u64;
	let mut out_std2 = std::ptr::null_mut();
	let mut out_extra2 = std::ptr::null_mut();
	let status = oidcrp_validate_token_and_require_scope_s(
		token_c.as_ptr(),
		scope_granted.as_ptr(),
		&mut out_subject2,
		&mut out_tt2,
		&mut out_std2,
		&mut out_extra2,
	);
	assert_eq!(status, ErrStatus::None.code());
	unsafe {
		oidcrp_free_string(out_subject2);
		oidcrp_free_string(out_std2);
		oidcrp_free_string(out_extra2);
	}

	let scope_missing = CString::new("admin").unwrap();
	let mut o1 = std::ptr::null_mut();
	let mut o2 = 0u64;
	let mut o3 = std::ptr::null_mut();
	let mut o4 = std::ptr::null_mut();
	let status = oidcrp_validate_token_and_require_scope_s(
		token_c.as_ptr(),
		scope_missing.as_ptr(),
		&mut o1,
		&mut o2,
		&mut o3,
		&mut o4,
	);
	assert_eq!(status, ErrStatus::MissingRequiredScope.code());
	unsafe {
		oidcrp_free_string(o1);
		oidcrp_free_string(o3);
		oidcrp_free_string(o4);
	}

	assert_eq!(oidcrp_uninitialize(), ErrStatus::None.code());
	// Double-uninitialize tolerated by the ABI contract.
	assert_eq!(oidcrp_uninitialize(), ErrStatus::None.code());
}

#[cfg(feature = "integration-tests")]
#[test]
fn status_text_is_stable_for_every_taxonomy_code() {
	for code in [
		0x0u64, 0x100, 0x101, 0x102, 0x103, 0x104, 0x105, 0x106, 0x107, 0x108, 0x109, 0x10A, 0x10B,
		0x10C, 0x10D,
	] {
		let ptr = oidcrp_status_text(code);
		let text = unsafe { take_string(ptr) };
		assert!(!text.is_empty());
	}
}
