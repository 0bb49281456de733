use thiserror::Error;

/// Closed, numerically stable status taxonomy shared by the native API and
/// the C ABI. Values are pinned — the C ABI is the contract, and numeric
/// stability matters more here than anywhere else in the crate.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ErrStatus {
	#[error("success")]
	None = 0x0,
	#[error("unknown error")]
	Unknown = 0x100,
	#[error("invalid issuer")]
	InvalidIss = 0x101,
	#[error("provider already initialized")]
	AlreadyInitialized = 0x102,
	#[error("provider not initialized")]
	NotInitialized = 0x103,
	#[error("timeout waiting for provider readiness")]
	Timeout = 0x104,
	#[error("token uses an unexpected signing method")]
	TokenUnexpectedSigningMethod = 0x105,
	#[error("token is malformed")]
	TokenMalformed = 0x106,
	#[error("token is expired or not valid yet")]
	TokenExpiredOrNotValidYet = 0x107,
	#[error("token references an unknown signing key")]
	TokenUnknownKey = 0x108,
	#[error("token signature is invalid")]
	TokenInvalidSignature = 0x109,
	#[error("token validation failed")]
	TokenValidationFailed = 0x10A,
	#[error("provider is closed")]
	Closed = 0x10B,
	#[error("provider observed an inconsistent initialization state")]
	WrongInitialization = 0x10C,
	#[error("required scope is missing")]
	MissingRequiredScope = 0x10D,
}

impl ErrStatus {
	/// The numeric code as carried across the C ABI.
	pub const fn code(self) -> u64 {
		self as u64
	}

	/// Human-readable text for a raw status code. Unrecognized codes map to
	/// the text for `Unknown` rather than panicking — this function is
	/// reachable from foreign callers who may pass back a code we didn't
	/// produce.
	pub fn status_text(code: u64) -> &'static str {
		match code {
			0x0 => "success",
			0x100 => "unknown error",
			0x101 => "invalid issuer",
			0x102 => "provider already initialized",
			0x103 => "provider not initialized",
			0x104 => "timeout waiting for provider readiness",
			0x105 => "token uses an unexpected signing method",
			0x106 => "token is malformed",
			0x107 => "token is expired or not valid yet",
			0x108 => "token references an unknown signing key",
			0x109 => "token signature is invalid",
			0x10A => "token validation failed",
			0x10B => "provider is closed",
			0x10C => "provider observed an inconsistent initialization state",
			0x10D => "required scope is missing",
			_ => "unknown error",
		}
	}

	pub fn is_success(self) -> bool {
		matches!(self, ErrStatus::None)
	}
}

/// Maps a `jsonwebtoken` validation failure onto the taxonomy, per the
/// ordering in the token validator's step 6.
pub fn from_jwt_error(err: &jsonwebtoken::errors::Error) -> ErrStatus {
	use jsonwebtoken::errors::ErrorKind;
	match err.kind() {
		ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
			ErrStatus::TokenMalformed
		}
		ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
			ErrStatus::TokenExpiredOrNotValidYet
		}
		ErrorKind::InvalidSignature
		| ErrorKind::InvalidRsaKey(_)
		| ErrorKind::InvalidEcdsaKey
		| ErrorKind::InvalidKeyFormat
		| ErrorKind::Crypto(_) => ErrStatus::TokenInvalidSignature,
		ErrorKind::InvalidAlgorithm => ErrStatus::TokenUnexpectedSigningMethod,
		_ => ErrStatus::TokenValidationFailed,
	}
}

#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn code_values_are_pinned() {
		assert_eq!(ErrStatus::None.code(), 0x0);
		assert_eq!(ErrStatus::Unknown.code(), 0x100);
		assert_eq!(ErrStatus::InvalidIss.code(), 0x101);
		assert_eq!(ErrStatus::AlreadyInitialized.code(), 0x102);
		assert_eq!(ErrStatus::NotInitialized.code(), 0x103);
		assert_eq!(ErrStatus::Timeout.code(), 0x104);
		assert_eq!(ErrStatus::TokenUnexpectedSigningMethod.code(), 0x105);
		assert_eq!(ErrStatus::TokenMalformed.code(), 0x106);
		assert_eq!(ErrStatus::TokenExpiredOrNotValidYet.code(), 0x107);
		assert_eq!(ErrStatus::TokenUnknownKey.code(), 0x108);
		assert_eq!(ErrStatus::TokenInvalidSignature.code(), 0x109);
		assert_eq!(ErrStatus::TokenValidationFailed.code(), 0x10A);
		assert_eq!(ErrStatus::Closed.code(), 0x10B);
		assert_eq!(ErrStatus::WrongInitialization.code(), 0x10C);
		assert_eq!(ErrStatus::MissingRequiredScope.code(), 0x10D);
	}

	#[test]
	fn status_text_unknown_code_falls_back() {
		assert_eq!(ErrStatus::status_text(0xDEAD), "unknown error");
		assert_eq!(ErrStatus::status_text(0x107), "token is expired or not valid yet");
	}

	#[test]
	fn is_success_only_for_none() {
		assert!(ErrStatus::None.is_success());
		assert!(!ErrStatus::Unknown.is_success());
	}
}
