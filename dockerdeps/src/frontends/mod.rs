mod dockerfile;

pub use dockerfile::DockerfileFrontend;
