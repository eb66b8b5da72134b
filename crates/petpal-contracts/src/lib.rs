//! PetPal contract generation and signature lifecycle
//!
//! Templates are filled from a target entity (employee or client company)
//! plus the issuing agency, stored as drafts with a signatory roster, sent
//! out as signing links and signed party by party.
//!
//! ```text
//! TemplateStore ─┐
//!                ├─▶ VariableResolver ─▶ TemplateRenderer ─┐
//! EntityDirectory┘         RosterBuilder ──────────────────┴─▶ ContractLifecycle ─▶ ContractStore
//!                                                                   ▲
//!                                          SignatureCaptureFlow ────┘
//! ```

pub mod contract;
pub mod directory;
pub mod entity;
pub mod error;
pub mod format;
pub mod lifecycle;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod render;
pub mod resolution;
pub mod roster;
pub mod selection;
pub mod signing;
pub mod store;
pub mod template;
pub mod token;

pub use contract::{
    AuditBlock, ContractStatus, DataSnapshot, GeneratedContract, NetworkOrigin, ServiceRef,
    Signatory, SignatoryRef, SignatoryRole, SignatureStatus, StatusTransition, TemplateRef,
};
pub use directory::{DirectorySeed, EntityDirectory, MemoryEntityDirectory};
pub use entity::{
    Address, Agency, BusinessUnit, ClientCompany, ContractParty, ContractedService, Employee,
    EntityKind, Partner, Representative, TargetEntity, VetLicense,
};
pub use error::{ContractError, ContractResult};
pub use lifecycle::{
    ContractFilter, ContractLifecycle, GenerateRequest, IssuedLink, LifecycleConfig,
    SendOutcome, SignatureOutcome, SkippedSignatory, DEFAULT_SIGNING_BASE_URL,
};
pub use render::{RenderMode, TemplateRenderer};
pub use resolution::{ResolutionContext, TokenTable, TokenValue, VariableResolver};
pub use roster::RosterBuilder;
pub use signing::{
    SignatureCaptureFlow, SignatureSubmission, SignerView, SigningRefusal, SigningView,
    SubmitOutcome,
};
pub use store::{CachedContractStore, ContractStore, MemoryContractStore};
pub use template::{ContractTemplate, MemoryTemplateStore, TemplateSeed, TemplateStore};
pub use token::SigningToken;
