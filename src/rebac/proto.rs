tonic::include_proto!("authzed.api.v1");
