use std::path::PathBuf;

use kiln_build::BuildFailure;
use kiln_codegen::TemplateError;
use kiln_registry::RegistryError;
use thiserror::Error;

use crate::artifact::ArtifactFailure;

/// Coarse classification of an [`Error`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	TemplateMismatch,
	CompileError,
	CompileTimeout,
	VerificationFailed,
	UnknownType,
	DuplicateType,
	Construct,
	Config,
	Io,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("dynamic code skeleton mismatch: {0}")]
	Template(#[from] TemplateError),
	#[error(transparent)]
	Artifact(#[from] ArtifactFailure),
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error("invalid configuration {}: {message}", .path.display())]
	Config { path: PathBuf, message: String },
	#[error("unknown component family `{0}`")]
	UnknownFamily(String),
}

impl From<BuildFailure> for Error {
	fn from(failure: BuildFailure) -> Self {
		Error::Artifact(ArtifactFailure::Build(failure))
	}
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::Template(_) => ErrorKind::TemplateMismatch,
			Error::Artifact(failure) => match failure {
				ArtifactFailure::Build(BuildFailure::Compile { .. } | BuildFailure::NoCompiler(_)) => ErrorKind::CompileError,
				ArtifactFailure::Build(BuildFailure::Timeout { .. }) => ErrorKind::CompileTimeout,
				ArtifactFailure::Build(BuildFailure::Io { .. }) => ErrorKind::Io,
				ArtifactFailure::Load { .. } | ArtifactFailure::Verification { .. } | ArtifactFailure::Panicked { .. } => {
					ErrorKind::VerificationFailed
				}
			},
			Error::Registry(error) => match error {
				RegistryError::UnknownType { .. } | RegistryError::FamilyMismatch { .. } => ErrorKind::UnknownType,
				RegistryError::DuplicateType { .. } => ErrorKind::DuplicateType,
				RegistryError::Construct { .. } => ErrorKind::Construct,
			},
			Error::Config { .. } | Error::UnknownFamily(_) => ErrorKind::Config,
		}
	}
}
