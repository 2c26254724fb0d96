/*
   Polar (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/
//! Project membership for the meridian control plane.
//!
//! A [`Member`](member::Member) is the contract a project-management backend
//! must satisfy; [`ProjectsService`](service::ProjectsService) wraps whichever
//! backend is installed and applies the one behavior that is uniform across
//! all of them: best-effort teardown of a deleted project's log streams.

pub mod local;
pub mod member;
pub mod schemas;
pub mod service;
pub mod teardown;

pub use local::LocalMember;
pub use member::Member;
pub use service::ProjectsService;
pub use teardown::LogTeardown;

use log_collector::LogStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectsError {
    #[error("project {0} does not exist")]
    ProjectNotFound(String),

    #[error("project {0} already exists")]
    Conflict(String),

    #[error("project {name} still owns {resources} resources, refusing to delete")]
    PreconditionFailed { name: String, resources: u64 },

    #[error("invalid project: {0}")]
    InvalidProject(String),

    /// Log teardown ran out of fallbacks while cleaning up after a deletion.
    #[error(transparent)]
    LogStore(#[from] LogStoreError),
}
