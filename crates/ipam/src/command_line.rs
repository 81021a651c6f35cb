/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2023 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(name = "node-ipam-agent")]
#[command(about = "Reserve node allocation prefix addresses that conflict with local routes")]
#[command(version)]
pub struct Options {
    // config is the path to the node IPAM configuration file.
    #[arg(long, short, env = "NODE_IPAM_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    // dump prints every reserved address once the reservation pass is done.
    #[arg(long)]
    pub dump: bool,
}

impl Options {
    pub fn load() -> Self {
        Self::parse()
    }
}
