// Copyright 2018 Alex Crawford
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core of an over-the-air system-image update resolver: trust-chain
//! management, a failure-recovering state machine, candidate upgrade path
//! generation and a weighted scoring policy.

pub mod candidates;
pub mod context;
pub mod download;
pub mod errors;
pub mod gpg;
pub mod keyring;
pub mod metrics;
pub mod model;
pub mod scores;
pub mod state;

pub use context::ResolverContext;
pub use errors::ResolverError;
pub use state::State;
