// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

pub use tokio::time::{Duration, Instant};

pub mod clock;

pub use clock::{Clock, TokioClock};
